//! CIL instruction encoding and disassembly
//!
//! Provides [`IlBuilder`] for emitting instruction streams with labels and
//! [`disassemble`] for rendering encoded bodies in an ILDASM-like listing.

use crate::table::Token;
use std::fmt::{self, Display, Formatter};

/// Operand shape of an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    /// Signed 8-bit immediate
    ShortI,
    /// 32-bit immediate
    I32,
    /// 8-bit argument/local index
    ShortVar,
    /// 16-bit argument/local index
    Var,
    /// Metadata or user-string token
    Token,
    /// 32-bit relative branch target
    Branch,
}

macro_rules! opcodes {
    ($($name:ident => ($prefix:expr, $byte:expr, $mnemonic:expr, $operand:ident),)*) => {
        /// Subset of CIL opcodes the emitter produces
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OpCode {
            $($name,)*
        }

        impl OpCode {
            /// Every supported opcode
            pub const ALL: &'static [OpCode] = &[$(OpCode::$name,)*];

            /// `(two-byte prefix, opcode byte)`
            #[must_use]
            pub const fn encoding(self) -> (Option<u8>, u8) {
                match self {
                    $(OpCode::$name => ($prefix, $byte),)*
                }
            }

            /// ILDASM mnemonic
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(OpCode::$name => $mnemonic,)*
                }
            }

            /// Operand shape
            #[must_use]
            pub const fn operand(self) -> OperandKind {
                match self {
                    $(OpCode::$name => OperandKind::$operand,)*
                }
            }
        }
    };
}

opcodes! {
    Nop => (None, 0x00, "nop", None),
    Ldarg0 => (None, 0x02, "ldarg.0", None),
    Ldarg1 => (None, 0x03, "ldarg.1", None),
    Ldarg2 => (None, 0x04, "ldarg.2", None),
    Ldarg3 => (None, 0x05, "ldarg.3", None),
    Ldloc0 => (None, 0x06, "ldloc.0", None),
    Ldloc1 => (None, 0x07, "ldloc.1", None),
    Ldloc2 => (None, 0x08, "ldloc.2", None),
    Ldloc3 => (None, 0x09, "ldloc.3", None),
    Stloc0 => (None, 0x0A, "stloc.0", None),
    Stloc1 => (None, 0x0B, "stloc.1", None),
    Stloc2 => (None, 0x0C, "stloc.2", None),
    Stloc3 => (None, 0x0D, "stloc.3", None),
    LdargS => (None, 0x0E, "ldarg.s", ShortVar),
    LdlocS => (None, 0x11, "ldloc.s", ShortVar),
    StlocS => (None, 0x13, "stloc.s", ShortVar),
    Ldnull => (None, 0x14, "ldnull", None),
    LdcI4M1 => (None, 0x15, "ldc.i4.m1", None),
    LdcI40 => (None, 0x16, "ldc.i4.0", None),
    LdcI41 => (None, 0x17, "ldc.i4.1", None),
    LdcI42 => (None, 0x18, "ldc.i4.2", None),
    LdcI43 => (None, 0x19, "ldc.i4.3", None),
    LdcI44 => (None, 0x1A, "ldc.i4.4", None),
    LdcI45 => (None, 0x1B, "ldc.i4.5", None),
    LdcI46 => (None, 0x1C, "ldc.i4.6", None),
    LdcI47 => (None, 0x1D, "ldc.i4.7", None),
    LdcI48 => (None, 0x1E, "ldc.i4.8", None),
    LdcI4S => (None, 0x1F, "ldc.i4.s", ShortI),
    LdcI4 => (None, 0x20, "ldc.i4", I32),
    Dup => (None, 0x25, "dup", None),
    Pop => (None, 0x26, "pop", None),
    Call => (None, 0x28, "call", Token),
    Ret => (None, 0x2A, "ret", None),
    Br => (None, 0x38, "br", Branch),
    Brfalse => (None, 0x39, "brfalse", Branch),
    Brtrue => (None, 0x3A, "brtrue", Branch),
    Callvirt => (None, 0x6F, "callvirt", Token),
    Ldstr => (None, 0x72, "ldstr", Token),
    Newobj => (None, 0x73, "newobj", Token),
    Throw => (None, 0x7A, "throw", None),
    Ldfld => (None, 0x7B, "ldfld", Token),
    Stfld => (None, 0x7D, "stfld", Token),
    Ldsfld => (None, 0x7E, "ldsfld", Token),
    Stsfld => (None, 0x80, "stsfld", Token),
    Ldftn => (Some(0xFE), 0x06, "ldftn", Token),
    Ldarg => (Some(0xFE), 0x09, "ldarg", Var),
    Ldloc => (Some(0xFE), 0x0C, "ldloc", Var),
    Stloc => (Some(0xFE), 0x0E, "stloc", Var),
}

impl OpCode {
    fn decode(prefix: Option<u8>, byte: u8) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.encoding() == (prefix, byte))
    }
}

impl Display for OpCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Branch target placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// Instruction stream builder with forward-branch fixups
#[derive(Debug, Clone, Default)]
pub struct IlBuilder {
    code: Vec<u8>,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, Label)>,
}

impl IlBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current code offset
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    fn opcode(&mut self, op: OpCode) {
        let (prefix, byte) = op.encoding();
        if let Some(prefix) = prefix {
            self.code.push(prefix);
        }
        self.code.push(byte);
    }

    /// Emit an operand-less instruction
    ///
    /// # Errors
    /// Returns error if `op` takes an operand
    pub fn op(&mut self, op: OpCode) -> Result<(), IlError> {
        if op.operand() != OperandKind::None {
            return Err(IlError::OperandMismatch(op));
        }
        self.opcode(op);
        Ok(())
    }

    /// Emit an instruction taking a token
    ///
    /// # Errors
    /// Returns error if `op` does not take a token
    pub fn token(&mut self, op: OpCode, token: Token) -> Result<(), IlError> {
        if op.operand() != OperandKind::Token {
            return Err(IlError::OperandMismatch(op));
        }
        self.opcode(op);
        self.code.extend_from_slice(&token.raw().to_le_bytes());
        Ok(())
    }

    /// Load an int32 constant using the shortest form
    pub fn ldc_i4(&mut self, value: i32) {
        const SHORT: [OpCode; 10] = [
            OpCode::LdcI4M1,
            OpCode::LdcI40,
            OpCode::LdcI41,
            OpCode::LdcI42,
            OpCode::LdcI43,
            OpCode::LdcI44,
            OpCode::LdcI45,
            OpCode::LdcI46,
            OpCode::LdcI47,
            OpCode::LdcI48,
        ];
        if (-1..=8).contains(&value) {
            self.opcode(SHORT[(value + 1) as usize]);
        } else if let Ok(byte) = i8::try_from(value) {
            self.opcode(OpCode::LdcI4S);
            self.code.push(byte as u8);
        } else {
            self.opcode(OpCode::LdcI4);
            self.code.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn var_op(&mut self, index: u16, short: [OpCode; 4], short_form: OpCode, long_form: OpCode) {
        if index < 4 {
            self.opcode(short[index as usize]);
        } else if let Ok(byte) = u8::try_from(index) {
            self.opcode(short_form);
            self.code.push(byte);
        } else {
            self.opcode(long_form);
            self.code.extend_from_slice(&index.to_le_bytes());
        }
    }

    /// Load argument `index`
    pub fn ldarg(&mut self, index: u16) {
        self.var_op(
            index,
            [OpCode::Ldarg0, OpCode::Ldarg1, OpCode::Ldarg2, OpCode::Ldarg3],
            OpCode::LdargS,
            OpCode::Ldarg,
        );
    }

    /// Load local slot `index`
    pub fn ldloc(&mut self, index: u16) {
        self.var_op(
            index,
            [OpCode::Ldloc0, OpCode::Ldloc1, OpCode::Ldloc2, OpCode::Ldloc3],
            OpCode::LdlocS,
            OpCode::Ldloc,
        );
    }

    /// Store to local slot `index`
    pub fn stloc(&mut self, index: u16) {
        self.var_op(
            index,
            [OpCode::Stloc0, OpCode::Stloc1, OpCode::Stloc2, OpCode::Stloc3],
            OpCode::StlocS,
            OpCode::Stloc,
        );
    }

    /// Allocate a label to be marked later
    pub fn define_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current offset
    ///
    /// # Errors
    /// Returns error if the label is unknown or already marked
    pub fn mark_label(&mut self, label: Label) -> Result<(), IlError> {
        let offset = self.offset();
        match self.labels.get_mut(label.0) {
            Some(slot @ None) => {
                *slot = Some(offset);
                Ok(())
            }
            Some(Some(_)) => Err(IlError::LabelRedefined(label.0)),
            None => Err(IlError::UnknownLabel(label.0)),
        }
    }

    /// Emit a long-form branch to `label`
    ///
    /// # Errors
    /// Returns error if `op` is not a branch
    pub fn branch(&mut self, op: OpCode, label: Label) -> Result<(), IlError> {
        if op.operand() != OperandKind::Branch {
            return Err(IlError::OperandMismatch(op));
        }
        self.opcode(op);
        self.fixups.push((self.code.len(), label));
        self.code.extend_from_slice(&[0; 4]);
        Ok(())
    }

    /// Resolve branches and return the code bytes
    ///
    /// # Errors
    /// Returns error if a branch targets a label that was never marked
    pub fn finish(mut self) -> Result<Vec<u8>, IlError> {
        for (position, label) in std::mem::take(&mut self.fixups) {
            let target = self
                .labels
                .get(label.0)
                .copied()
                .flatten()
                .ok_or(IlError::UnmarkedLabel(label.0))?;
            let next = position as i64 + 4;
            let delta = i32::try_from(i64::from(target) - next)
                .map_err(|_| IlError::BranchOutOfRange(label.0))?;
            self.code[position..position + 4].copy_from_slice(&delta.to_le_bytes());
        }
        Ok(self.code)
    }
}

/// Decoded operand value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Int(i32),
    Var(u16),
    Token(Token),
    /// Absolute target offset
    Target(u32),
}

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: u32,
    pub opcode: OpCode,
    pub operand: Operand,
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mnemonic = self.opcode.mnemonic();
        match self.operand {
            Operand::None => write!(f, "IL_{:04x}:  {mnemonic}", self.offset),
            Operand::Int(v) => write!(f, "IL_{:04x}:  {mnemonic:<10} {v}", self.offset),
            Operand::Var(v) => write!(f, "IL_{:04x}:  {mnemonic:<10} {v}", self.offset),
            Operand::Token(t) => write!(f, "IL_{:04x}:  {mnemonic:<10} {t}", self.offset),
            Operand::Target(t) => write!(f, "IL_{:04x}:  {mnemonic:<10} IL_{t:04x}", self.offset),
        }
    }
}

fn take<const N: usize>(code: &[u8], at: usize) -> Result<[u8; N], IlError> {
    code.get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(IlError::Truncated(at))
}

/// Decode a code stream (without method header)
///
/// # Errors
/// Returns error on unknown opcodes or truncated operands
pub fn disassemble(code: &[u8]) -> Result<Vec<Instruction>, IlError> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < code.len() {
        let offset = pos as u32;
        let (prefix, byte) = if code[pos] == 0xFE {
            let [b] = take::<1>(code, pos + 1)?;
            pos += 2;
            (Some(0xFE), b)
        } else {
            pos += 1;
            (None, code[pos - 1])
        };
        let opcode = OpCode::decode(prefix, byte).ok_or(IlError::UnknownOpcode { offset, byte })?;
        let operand = match opcode.operand() {
            OperandKind::None => Operand::None,
            OperandKind::ShortI => {
                let [b] = take::<1>(code, pos)?;
                pos += 1;
                Operand::Int(i32::from(b as i8))
            }
            OperandKind::I32 => {
                let bytes = take::<4>(code, pos)?;
                pos += 4;
                Operand::Int(i32::from_le_bytes(bytes))
            }
            OperandKind::ShortVar => {
                let [b] = take::<1>(code, pos)?;
                pos += 1;
                Operand::Var(u16::from(b))
            }
            OperandKind::Var => {
                let bytes = take::<2>(code, pos)?;
                pos += 2;
                Operand::Var(u16::from_le_bytes(bytes))
            }
            OperandKind::Token => {
                let bytes = take::<4>(code, pos)?;
                pos += 4;
                Operand::Token(Token::from_raw(u32::from_le_bytes(bytes)))
            }
            OperandKind::Branch => {
                let bytes = take::<4>(code, pos)?;
                pos += 4;
                let target = pos as i64 + i64::from(i32::from_le_bytes(bytes));
                Operand::Target(target as u32)
            }
        };
        out.push(Instruction {
            offset,
            opcode,
            operand,
        });
    }
    Ok(out)
}

/// Render a code stream as one instruction per line
///
/// # Errors
/// Returns error if the stream cannot be decoded
pub fn listing(code: &[u8]) -> Result<String, IlError> {
    let lines: Vec<String> = disassemble(code)?.iter().map(ToString::to_string).collect();
    Ok(lines.join("\n"))
}

/// Errors raised while building or decoding IL
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IlError {
    /// Operand kind does not match the opcode
    #[error("opcode {0} used with the wrong operand kind")]
    OperandMismatch(OpCode),

    /// Label was never allocated
    #[error("unknown label {0}")]
    UnknownLabel(usize),

    /// Label marked twice
    #[error("label {0} marked twice")]
    LabelRedefined(usize),

    /// Branch to a label that was never marked
    #[error("label {0} was never marked")]
    UnmarkedLabel(usize),

    /// Branch displacement does not fit 32 bits
    #[error("branch to label {0} out of range")]
    BranchOutOfRange(usize),

    /// Unknown opcode byte
    #[error("unknown opcode {byte:#04x} at IL_{offset:04x}")]
    UnknownOpcode { offset: u32, byte: u8 },

    /// Stream ended inside an instruction or header
    #[error("truncated IL at offset {0}")]
    Truncated(usize),

    /// Method body header is not tiny or fat
    #[error("invalid method header byte {0:#04x}")]
    InvalidHeader(u8),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ldc_i4_picks_short_forms() {
        let mut il = IlBuilder::new();
        il.ldc_i4(-1);
        il.ldc_i4(8);
        il.ldc_i4(-2);
        il.ldc_i4(1000);
        let code = il.finish().unwrap();
        assert_eq!(code, vec![0x15, 0x1E, 0x1F, 0xFE, 0x20, 0xE8, 0x03, 0x00, 0x00]);
    }

    #[test]
    fn locals_use_short_then_long_forms() {
        let mut il = IlBuilder::new();
        il.stloc(2);
        il.ldloc(7);
        il.ldloc(300);
        il.ldarg(0);
        let code = il.finish().unwrap();
        assert_eq!(code, vec![0x0C, 0x11, 0x07, 0xFE, 0x0C, 0x2C, 0x01, 0x02]);
    }

    #[test]
    fn forward_branch_is_patched() {
        let mut il = IlBuilder::new();
        let end = il.define_label();
        il.branch(OpCode::Br, end).unwrap();
        il.op(OpCode::Nop).unwrap();
        il.mark_label(end).unwrap();
        il.op(OpCode::Ret).unwrap();
        let code = il.finish().unwrap();
        assert_eq!(code, vec![0x38, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2A]);
        let decoded = disassemble(&code).unwrap();
        assert_eq!(decoded[0].operand, Operand::Target(6));
    }

    #[test]
    fn unmarked_label_fails() {
        let mut il = IlBuilder::new();
        let label = il.define_label();
        il.branch(OpCode::Brtrue, label).unwrap();
        assert_eq!(il.finish(), Err(IlError::UnmarkedLabel(0)));
    }

    #[test]
    fn operand_mismatch_is_rejected() {
        let mut il = IlBuilder::new();
        assert!(il.op(OpCode::Call).is_err());
        assert!(il.token(OpCode::Ret, Token::NIL).is_err());
    }

    #[test]
    fn listing_matches_ildasm_layout() {
        let mut il = IlBuilder::new();
        il.token(OpCode::Ldstr, Token::user_string(1)).unwrap();
        il.ldc_i4(-2);
        il.token(OpCode::Newobj, Token::from_raw(0x0600_0002)).unwrap();
        il.op(OpCode::Throw).unwrap();
        let text = listing(&il.finish().unwrap()).unwrap();
        assert_eq!(
            text,
            "IL_0000:  ldstr      0x70000001\n\
             IL_0005:  ldc.i4.s   -2\n\
             IL_0007:  newobj     0x06000002\n\
             IL_000c:  throw"
        );
    }

    #[test]
    fn unknown_opcode_reports_offset() {
        let err = disassemble(&[0x00, 0xA5]).unwrap_err();
        assert_eq!(err, IlError::UnknownOpcode { offset: 1, byte: 0xA5 });
    }
}
