//! Transaction trace decoding.
//!
//! Walks a fetched transaction's top-level instructions in order,
//! classifies each through the protocol decode tables, attaches its
//! inner-instruction group as children, and feeds account creations
//! into the transient account registry along the way.

pub mod registry;

pub use registry::{TransientAccount, TransientAccountRegistry};

use crate::raw::{RawInstruction, RawTransaction};
use clmm_keeper_protocols::decode::{InstructionKind, classify};
use solana_sdk::pubkey::Pubkey;
use tracing::trace;

/// One decoded instruction with its inner calls attached.
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    pub program_id: Pubkey,
    pub kind: InstructionKind,
    pub accounts: Vec<Pubkey>,
    pub data: Vec<u8>,
    pub inner: Vec<DecodedInstruction>,
}

impl DecodedInstruction {
    /// Depth-first walk over this instruction and its inner calls.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a DecodedInstruction)) {
        visit(self);
        for inner in &self.inner {
            inner.walk(visit);
        }
    }
}

/// Decodes the full trace, populating `registry` as creations are seen.
///
/// Unknown program ids or undecodable payloads classify as
/// `Unrecognized` and keep their raw payload; decoding never fails on
/// them.
pub fn decode_transaction(
    raw: &RawTransaction,
    registry: &mut TransientAccountRegistry,
) -> Vec<DecodedInstruction> {
    let mut decoded = Vec::with_capacity(raw.instructions.len());
    for (index, instruction) in raw.instructions.iter().enumerate() {
        let mut top = decode_one(raw, instruction, registry);
        if let Some(group) = raw.inner_groups.get(&index) {
            top.inner = group
                .iter()
                .map(|inner| decode_one(raw, inner, registry))
                .collect();
        }
        decoded.push(top);
    }
    decoded
}

fn decode_one(
    raw: &RawTransaction,
    instruction: &RawInstruction,
    registry: &mut TransientAccountRegistry,
) -> DecodedInstruction {
    let program_id = raw
        .account_keys
        .get(instruction.program_id_index)
        .copied()
        .unwrap_or_default();
    let accounts: Vec<Pubkey> = instruction
        .accounts
        .iter()
        .filter_map(|i| raw.account_keys.get(*i).copied())
        .collect();
    let kind = classify(&program_id, &accounts, &instruction.data);
    trace!(program = %program_id, kind = kind.name(), "decoded instruction");

    match &kind {
        InstructionKind::InitializeTokenAccount {
            account,
            mint,
            owner,
        } => registry.record(*account, *mint, *owner),
        InstructionKind::CreateAssociatedTokenAccount {
            account,
            owner,
            mint,
            ..
        } => registry.record(*account, *mint, *owner),
        _ => {}
    }

    DecodedInstruction {
        program_id,
        kind,
        accounts,
        data: instruction.data.clone(),
        inner: Vec::new(),
    }
}
