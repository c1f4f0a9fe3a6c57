use std::os::fd::RawFd;
use std::path::PathBuf;

use anyhow::Result;
use rpmstage_core::PackageMember;

pub const TRANS_PREPARATION: u64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseCode {
    InstProgress,
    InstStart,
    InstOpenFile,
    InstCloseFile,
    TransProgress,
    TransStart,
    TransStop,
    UninstProgress,
    UninstStart,
    UninstStop,
    UnpackError,
    CpioError,
    ScriptError,
    ScriptStart,
    ScriptStop,
    InstStop,
    ElemProgress,
}

impl PhaseCode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x1 => Some(Self::InstProgress),
            0x2 => Some(Self::InstStart),
            0x4 => Some(Self::InstOpenFile),
            0x8 => Some(Self::InstCloseFile),
            0x10 => Some(Self::TransProgress),
            0x20 => Some(Self::TransStart),
            0x40 => Some(Self::TransStop),
            0x80 => Some(Self::UninstProgress),
            0x100 => Some(Self::UninstStart),
            0x200 => Some(Self::UninstStop),
            0x400 => Some(Self::UnpackError),
            0x800 => Some(Self::CpioError),
            0x1000 => Some(Self::ScriptError),
            0x2000 => Some(Self::ScriptStart),
            0x4000 => Some(Self::ScriptStop),
            0x8000 => Some(Self::InstStop),
            0x10000 => Some(Self::ElemProgress),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::InstProgress => 0x1,
            Self::InstStart => 0x2,
            Self::InstOpenFile => 0x4,
            Self::InstCloseFile => 0x8,
            Self::TransProgress => 0x10,
            Self::TransStart => 0x20,
            Self::TransStop => 0x40,
            Self::UninstProgress => 0x80,
            Self::UninstStart => 0x100,
            Self::UninstStop => 0x200,
            Self::UnpackError => 0x400,
            Self::CpioError => 0x800,
            Self::ScriptError => 0x1000,
            Self::ScriptStart => 0x2000,
            Self::ScriptStop => 0x4000,
            Self::InstStop => 0x8000,
            Self::ElemProgress => 0x10000,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CallbackKey {
    Member(PackageMember),
    Name(String),
}

impl CallbackKey {
    pub fn resolve(&self) -> (&str, Option<&PackageMember>) {
        match self {
            Self::Member(member) => (member.name.as_str(), Some(member)),
            Self::Name(name) => (name.as_str(), None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseEvent {
    pub phase: u32,
    pub amount: u64,
    pub total: u64,
    pub key: Option<CallbackKey>,
}

impl PhaseEvent {
    pub fn new(code: PhaseCode, amount: u64, total: u64, key: Option<CallbackKey>) -> Self {
        Self {
            phase: code.as_raw(),
            amount,
            total,
            key,
        }
    }
}

#[derive(Debug)]
pub enum CallbackReply {
    None,
    Package { fd: RawFd, path: PathBuf },
}

pub trait TransactionCallback {
    fn callback(&mut self, event: &PhaseEvent) -> Result<CallbackReply>;
}
