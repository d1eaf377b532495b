//! Code generator seam
//!
//! The engine does not compile method bodies itself. A
//! [`MethodCodeGenerator`] produces symbolic IL ([`MethodIl`]) whose member
//! operands are [`MemberTarget`]s; the engine binds them to tokens of the
//! current generation, including synthesized lambdas, closures, anonymous
//! types and delegates the body relies on.

use enc_metadata::SignatureType;
use enc_symbols::{AnonymousTypeShape, DeclKey, DelegateShape, PrimitiveType, SymbolTable, SyntaxNodeId, TypeSymbol};
use serde::{Deserialize, Serialize};

/// Produces the body of one method of a compilation
pub trait MethodCodeGenerator {
    /// Generate the body of `method`
    ///
    /// # Errors
    /// Returns error if the body cannot be generated
    fn generate(&self, compilation: &SymbolTable, method: &DeclKey) -> Result<GeneratedBody, CodeGenError>;
}

/// Code generator failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("code generation failed for {method}: {message}")]
pub struct CodeGenError {
    pub method: String,
    pub message: String,
}

impl CodeGenError {
    #[must_use]
    pub fn new(method: &DeclKey, message: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            message: message.into(),
        }
    }
}

/// Output of the code generator for one method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedBody {
    /// Body of the method itself
    pub il: MethodIl,
    /// Lambdas and local functions, indexed by [`MemberTarget::Lambda`]
    pub lambdas: Vec<LambdaDef>,
    /// Closure scopes, indexed by [`MemberTarget::ClosureConstructor`]
    pub closures: Vec<ClosureDef>,
}

impl GeneratedBody {
    /// Body without lambdas or closures
    #[must_use]
    pub fn simple(il: MethodIl) -> Self {
        Self {
            il,
            lambdas: Vec::new(),
            closures: Vec::new(),
        }
    }
}

/// Symbolic instruction list with locals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodIl {
    pub ops: Vec<IlOp>,
    pub locals: Vec<LocalDef>,
    pub max_stack: u16,
}

impl MethodIl {
    #[must_use]
    pub fn new(ops: Vec<IlOp>, max_stack: u16) -> Self {
        Self {
            ops,
            locals: Vec::new(),
            max_stack,
        }
    }

    #[must_use]
    pub fn with_local(mut self, local: LocalDef) -> Self {
        self.locals.push(local);
        self
    }

    /// Every type the body mentions in locals or member operands
    #[must_use]
    pub fn referenced_types(&self) -> Vec<&TypeSymbol> {
        let mut types: Vec<&TypeSymbol> = self.locals.iter().map(|l| &l.ty).collect();
        for op in &self.ops {
            if let Some(target) = op.target() {
                types.extend(target.referenced_types());
            }
        }
        types
    }
}

/// Kind of a local variable slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalKind {
    /// Declared in source
    UserDefined,
    /// Introduced by the code generator
    Temp,
}

/// Local variable declared by a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDef {
    pub name: Option<String>,
    pub ty: TypeSymbol,
    pub kind: LocalKind,
    /// Declaring syntax node
    pub syntax: Option<SyntaxNodeId>,
}

impl LocalDef {
    /// User-declared local
    #[must_use]
    pub fn named(name: impl Into<String>, ty: TypeSymbol, syntax: SyntaxNodeId) -> Self {
        Self {
            name: Some(name.into()),
            ty,
            kind: LocalKind::UserDefined,
            syntax: Some(syntax),
        }
    }

    /// Compiler temporary
    #[must_use]
    pub fn temp(ty: TypeSymbol) -> Self {
        Self {
            name: None,
            ty,
            kind: LocalKind::Temp,
            syntax: None,
        }
    }
}

/// Symbolic instruction
///
/// Local operands index [`MethodIl::locals`]; labels are body-local ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IlOp {
    Nop,
    Pop,
    Dup,
    Ret,
    Throw,
    Ldnull,
    LdcI4(i32),
    Ldstr(String),
    Ldarg(u16),
    Ldloc(u16),
    Stloc(u16),
    Call(MemberTarget),
    Callvirt(MemberTarget),
    Newobj(MemberTarget),
    Ldfld(MemberTarget),
    Stfld(MemberTarget),
    Ldsfld(MemberTarget),
    Stsfld(MemberTarget),
    Ldftn(MemberTarget),
    Label(u32),
    Br(u32),
    BrTrue(u32),
    BrFalse(u32),
}

impl IlOp {
    /// Member operand, if any
    #[must_use]
    pub fn target(&self) -> Option<&MemberTarget> {
        match self {
            Self::Call(t)
            | Self::Callvirt(t)
            | Self::Newobj(t)
            | Self::Ldfld(t)
            | Self::Stfld(t)
            | Self::Ldsfld(t)
            | Self::Stsfld(t)
            | Self::Ldftn(t) => Some(t),
            _ => None,
        }
    }
}

/// Member operand of an instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberTarget {
    /// Method or field declared in the compilation
    Definition(DeclKey),
    /// Method of a referenced type
    ExternalMethod {
        owner: TypeSymbol,
        name: String,
        params: Vec<TypeSymbol>,
        return_type: TypeSymbol,
        is_static: bool,
    },
    /// Field of a referenced type
    ExternalField {
        owner: TypeSymbol,
        name: String,
        ty: TypeSymbol,
    },
    /// Method implementing lambda `n` of the body
    Lambda(usize),
    /// Static cache field of lambda `n`
    LambdaCache(usize),
    /// Singleton instance of the static lambda container
    LambdaContainerInstance,
    /// Constructor of closure `n`
    ClosureConstructor(usize),
    /// Field of closure `closure` holding captured variable `name`
    ClosureField { closure: usize, name: String },
    AnonymousTypeConstructor(AnonymousTypeShape),
    AnonymousTypeGetter { shape: AnonymousTypeShape, member: String },
    DelegateConstructor(DelegateShape),
    DelegateInvoke(DelegateShape),
}

impl MemberTarget {
    /// Method of a referenced type
    #[must_use]
    pub fn external_method(
        owner: TypeSymbol,
        name: impl Into<String>,
        params: Vec<TypeSymbol>,
        return_type: TypeSymbol,
        is_static: bool,
    ) -> Self {
        Self::ExternalMethod {
            owner,
            name: name.into(),
            params,
            return_type,
            is_static,
        }
    }

    fn referenced_types(&self) -> Vec<&TypeSymbol> {
        match self {
            Self::ExternalMethod {
                owner,
                params,
                return_type,
                ..
            } => std::iter::once(owner)
                .chain(params.iter())
                .chain(std::iter::once(return_type))
                .collect(),
            Self::ExternalField { owner, ty, .. } => vec![owner, ty],
            _ => Vec::new(),
        }
    }
}

/// Lambda or local function of a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaDef {
    /// Lambda syntax node
    pub syntax: SyntaxNodeId,
    /// Closure the lambda is an instance method of; `None` for static lambdas
    pub closure: Option<usize>,
    pub params: Vec<TypeSymbol>,
    pub return_type: TypeSymbol,
    pub body: MethodIl,
}

/// Closure scope of a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureDef {
    /// Scope syntax node
    pub scope_syntax: SyntaxNodeId,
    /// Captured variables
    pub captured: Vec<(String, TypeSymbol)>,
}

/// Signature element of a primitive type
#[must_use]
pub const fn primitive_signature(primitive: PrimitiveType) -> SignatureType {
    match primitive {
        PrimitiveType::Void => SignatureType::Void,
        PrimitiveType::Bool => SignatureType::Boolean,
        PrimitiveType::Char => SignatureType::Char,
        PrimitiveType::I1 => SignatureType::I1,
        PrimitiveType::U1 => SignatureType::U1,
        PrimitiveType::I2 => SignatureType::I2,
        PrimitiveType::U2 => SignatureType::U2,
        PrimitiveType::I4 => SignatureType::I4,
        PrimitiveType::U4 => SignatureType::U4,
        PrimitiveType::I8 => SignatureType::I8,
        PrimitiveType::U8 => SignatureType::U8,
        PrimitiveType::R4 => SignatureType::R4,
        PrimitiveType::R8 => SignatureType::R8,
        PrimitiveType::String => SignatureType::String,
        PrimitiveType::Object => SignatureType::Object,
        PrimitiveType::IntPtr => SignatureType::IntPtr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_types_cover_locals_and_operands() {
        let exception = TypeSymbol::external("System.Exception");
        let il = MethodIl::new(
            vec![
                IlOp::Ldstr("x".into()),
                IlOp::Newobj(MemberTarget::external_method(
                    exception.clone(),
                    ".ctor",
                    vec![TypeSymbol::STRING],
                    TypeSymbol::VOID,
                    false,
                )),
                IlOp::Throw,
            ],
            1,
        )
        .with_local(LocalDef::temp(TypeSymbol::INT64));
        let types = il.referenced_types();
        assert!(types.contains(&&exception));
        assert!(types.contains(&&TypeSymbol::INT64));
    }

    #[test]
    fn codegen_error_names_method() {
        let c = DeclKey::top_level("", "C", 0);
        let err = CodeGenError::new(&DeclKey::method(&c, "F", 0, "()"), "unsupported");
        assert_eq!(err.to_string(), "code generation failed for C.F(): unsupported");
    }
}
