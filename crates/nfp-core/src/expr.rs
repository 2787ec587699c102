use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{NftError, Result};

pub const NFT_REG_VERDICT: u32 = 0;
pub const NFT_REG_1: u32 = 1;
pub const NFT_REG_4: u32 = 4;
pub const NFT_REG32_00: u32 = 8;
pub const NFT_REG32_15: u32 = 23;

/// Size of one legacy 128-bit register in bytes.
pub const NFT_REG_SIZE: usize = 16;
pub const NFT_REG32_SIZE: usize = 4;
/// Register file length in 32-bit words, verdict area included.
pub const NFT_REG32_NUM: usize = 20;

pub const NF_DROP: i32 = 0;
pub const NF_ACCEPT: i32 = 1;
pub const NF_QUEUE: i32 = 3;
pub const NF_VERDICT_MASK: i32 = 0xff;
pub const NFT_CONTINUE: i32 = -1;
pub const NFT_BREAK: i32 = -2;
pub const NFT_JUMP: i32 = -3;
pub const NFT_GOTO: i32 = -4;
pub const NFT_RETURN: i32 = -5;

/// Destination register of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Register {
    Verdict,
    /// 128-bit registers 1..=4.
    Wide(u8),
    /// 32-bit registers 0..=15, wire ids 8..=23.
    Narrow(u8),
}

impl Register {
    pub fn parse(raw: u32) -> Result<Self> {
        match raw {
            NFT_REG_VERDICT => Ok(Register::Verdict),
            NFT_REG_1..=NFT_REG_4 => Ok(Register::Wide(raw as u8)),
            NFT_REG32_00..=NFT_REG32_15 => Ok(Register::Narrow((raw - NFT_REG32_00) as u8)),
            other => Err(NftError::range(format!("register {}", other))),
        }
    }

    pub fn id(self) -> u32 {
        match self {
            Register::Verdict => NFT_REG_VERDICT,
            Register::Wide(n) => u32::from(n),
            Register::Narrow(n) => NFT_REG32_00 + u32::from(n),
        }
    }

    pub fn is_verdict(self) -> bool {
        self == Register::Verdict
    }

    /// Offset into the register file in 32-bit words.
    fn word_offset(self) -> usize {
        match self {
            Register::Verdict => 0,
            Register::Wide(n) => usize::from(n) * NFT_REG_SIZE / NFT_REG32_SIZE,
            Register::Narrow(n) => usize::from(n) + NFT_REG_SIZE / NFT_REG32_SIZE,
        }
    }

    /// Check that `len` bytes stored here stay inside the register file.
    pub fn validate_store(self, len: usize) -> Result<()> {
        if len == 0 {
            return Err(NftError::invalid("empty register value"));
        }
        if len > NFT_REG_SIZE {
            return Err(NftError::range(format!("{} byte register value", len)));
        }
        if self.word_offset() * NFT_REG32_SIZE + len > NFT_REG32_NUM * NFT_REG32_SIZE {
            return Err(NftError::range(format!(
                "{} bytes overflow register {}",
                len,
                self.id()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Drop,
    Accept,
    Queue(u32),
    Continue,
    Break,
    Return,
    /// Target chain handle.
    Jump(u64),
    Goto(u64),
}

/// Verdict code before any chain target is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictCode {
    Terminal(i32),
    Jump,
    Goto,
}

impl VerdictCode {
    pub fn parse(code: i32) -> Result<Self> {
        match code {
            NFT_JUMP => Ok(VerdictCode::Jump),
            NFT_GOTO => Ok(VerdictCode::Goto),
            NFT_CONTINUE | NFT_BREAK | NFT_RETURN => Ok(VerdictCode::Terminal(code)),
            c if c >= 0 && matches!(c & NF_VERDICT_MASK, NF_DROP | NF_ACCEPT | NF_QUEUE) => {
                if c & NF_VERDICT_MASK != NF_QUEUE && c != c & NF_VERDICT_MASK {
                    return Err(NftError::invalid(format!("verdict code {:#x}", c)));
                }
                Ok(VerdictCode::Terminal(c))
            }
            other => Err(NftError::invalid(format!("verdict code {}", other))),
        }
    }

    pub fn needs_chain(self) -> bool {
        matches!(self, VerdictCode::Jump | VerdictCode::Goto)
    }
}

impl Verdict {
    /// Build a verdict from a parsed code; `chain` must be set exactly for jump/goto.
    pub fn from_code(code: VerdictCode, chain: Option<u64>) -> Result<Self> {
        match (code, chain) {
            (VerdictCode::Jump, Some(target)) => Ok(Verdict::Jump(target)),
            (VerdictCode::Goto, Some(target)) => Ok(Verdict::Goto(target)),
            (VerdictCode::Jump | VerdictCode::Goto, None) => {
                Err(NftError::invalid("jump verdict without a target chain"))
            }
            (VerdictCode::Terminal(_), Some(_)) => {
                Err(NftError::invalid("chain target on a terminal verdict"))
            }
            (VerdictCode::Terminal(c), None) => Ok(match c {
                NFT_CONTINUE => Verdict::Continue,
                NFT_BREAK => Verdict::Break,
                NFT_RETURN => Verdict::Return,
                NF_DROP => Verdict::Drop,
                NF_ACCEPT => Verdict::Accept,
                queued => Verdict::Queue(queued as u32),
            }),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Verdict::Drop => NF_DROP,
            Verdict::Accept => NF_ACCEPT,
            Verdict::Queue(code) => *code as i32,
            Verdict::Continue => NFT_CONTINUE,
            Verdict::Break => NFT_BREAK,
            Verdict::Return => NFT_RETURN,
            Verdict::Jump(_) => NFT_JUMP,
            Verdict::Goto(_) => NFT_GOTO,
        }
    }

    pub fn target(&self) -> Option<u64> {
        match self {
            Verdict::Jump(chain) | Verdict::Goto(chain) => Some(*chain),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Drop => f.write_str("drop"),
            Verdict::Accept => f.write_str("accept"),
            Verdict::Queue(code) => write!(f, "queue {}", code >> 16),
            Verdict::Continue => f.write_str("continue"),
            Verdict::Break => f.write_str("break"),
            Verdict::Return => f.write_str("return"),
            Verdict::Jump(chain) => write!(f, "jump #{}", chain),
            Verdict::Goto(chain) => write!(f, "goto #{}", chain),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImmediateData {
    Value(Vec<u8>),
    Verdict(Verdict),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Immediate {
    pub dreg: Register,
    pub data: ImmediateData,
}

impl Immediate {
    /// Enforce the register/payload pairing and register-file bounds.
    pub fn new(dreg: Register, data: ImmediateData) -> Result<Self> {
        match (&data, dreg.is_verdict()) {
            (ImmediateData::Value(_), true) => {
                return Err(NftError::invalid("raw value loaded into the verdict register"));
            }
            (ImmediateData::Verdict(_), false) => {
                return Err(NftError::invalid(format!(
                    "verdict loaded into data register {}",
                    dreg.id()
                )));
            }
            (ImmediateData::Value(bytes), false) => dreg.validate_store(bytes.len())?,
            (ImmediateData::Verdict(_), true) => {}
        }
        Ok(Self { dreg, data })
    }
}

/// One evaluation step of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expression {
    Immediate(Immediate),
}

impl Expression {
    pub const IMMEDIATE: &'static str = "immediate";

    pub fn name(&self) -> &'static str {
        match self {
            Expression::Immediate(_) => Self::IMMEDIATE,
        }
    }

    pub fn chain_reference(&self) -> Option<u64> {
        match self {
            Expression::Immediate(Immediate {
                data: ImmediateData::Verdict(verdict),
                ..
            }) => verdict.target(),
            Expression::Immediate(_) => None,
        }
    }
}
