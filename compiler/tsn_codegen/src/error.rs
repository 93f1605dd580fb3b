//! Code generation errors.
//!
//! Every failure is fatal to the compilation unit: the first error aborts
//! lowering and no module is produced. Errors carry the span of the node
//! being lowered when the failure surfaced.

use thiserror::Error;
use tsn_ir::{ProgramError, Span};

/// What went wrong.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodegenErrorKind {
    /// A free variable (or `this`) is not bound in any enclosing scope.
    #[error("cannot capture `{name}`: not bound in any enclosing scope")]
    UnresolvedCapture { name: String },

    /// A value cannot be realized in the requested layout.
    #[error("shape mismatch: expected `{expected}`, found `{found}`")]
    ShapeMismatch { expected: String, found: String },

    /// Extraction of a type that is not a member of the union.
    #[error("`{member}` is not a member of union `{union}`")]
    UnknownUnionMember { union: String, member: String },

    /// An override has no unique slot in the root vtable.
    #[error("no unique virtual slot for `{class}.{method}` (root slots: {})", candidates.join(", "))]
    AmbiguousVirtualSlot {
        class: String,
        method: String,
        candidates: Vec<String>,
    },

    /// A generic parameter has no concrete binding where one is required.
    #[error("type parameter `{param}` of `{decl}` has no concrete binding")]
    GenericBindingUnavailable { decl: String, param: String },

    /// A construct this backend does not lower.
    #[error("unsupported: {what}")]
    Unsupported { what: String },

    /// The resolved program violates the front-end contract.
    #[error("invalid program: {detail}")]
    InvalidProgram { detail: String },
}

/// A code generation error with its source location.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind} at {span}")]
pub struct CodegenError {
    pub kind: CodegenErrorKind,
    pub span: Span,
}

impl CodegenError {
    pub fn new(kind: CodegenErrorKind, span: Span) -> Self {
        CodegenError { kind, span }
    }

    /// Error without a location yet; the lowerer attaches one.
    pub fn bare(kind: CodegenErrorKind) -> Self {
        CodegenError::new(kind, Span::DUMMY)
    }

    /// Attach `span` unless a location is already known.
    #[must_use]
    pub fn at(mut self, span: Span) -> Self {
        if self.span.is_dummy() {
            self.span = span;
        }
        self
    }

    pub fn unresolved_capture(name: impl Into<String>) -> Self {
        Self::bare(CodegenErrorKind::UnresolvedCapture { name: name.into() })
    }

    pub fn shape_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::bare(CodegenErrorKind::ShapeMismatch {
            expected: expected.into(),
            found: found.into(),
        })
    }

    pub fn unknown_union_member(union: impl Into<String>, member: impl Into<String>) -> Self {
        Self::bare(CodegenErrorKind::UnknownUnionMember {
            union: union.into(),
            member: member.into(),
        })
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::bare(CodegenErrorKind::Unsupported { what: what.into() })
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::bare(CodegenErrorKind::InvalidProgram {
            detail: detail.into(),
        })
    }
}

impl From<ProgramError> for CodegenError {
    fn from(err: ProgramError) -> Self {
        CodegenError::invalid(err.to_string())
    }
}

/// Insert-or-reject violations in the meta-registry.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("`{key}` is already bound to a different {what}")]
    Conflict { key: String, what: &'static str },
    #[error("type parameter `{0}` is already bound in this scope")]
    DuplicateBinding(String),
}

impl From<RegistryError> for CodegenError {
    fn from(err: RegistryError) -> Self {
        CodegenError::invalid(err.to_string())
    }
}

pub type CodegenResult<T> = Result<T, CodegenError>;
