//! The comparison engine behind `cmp`.
//!
//! Comparison is routed by the kinds of the two operands before any value
//! is looked at:
//!
//! | lhs kind / rhs kind                         | route            |
//! |---------------------------------------------|------------------|
//! | equal, not extref                           | `Native`         |
//! | differ, one side `undefined`                | `UndefinedSide`  |
//! | both extref, or `null` against an extref    | `ExtRefIdentity` |
//! | anything else                               | `KindMismatch`   |
//!
//! `!=` and `!==` are computed as the negation of `==` / `===` on every
//! route, so the two are always exact complements.  Loose and strict
//! equality share one algorithm.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::BridgeError;
use crate::extref::{ResolvedRef, resolve_identity};
use crate::value::{DynKind, JsValue, Value};

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOperator {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
}

impl CmpOperator {
    pub const ALL: [CmpOperator; 8] = [
        Self::Lt,
        Self::Gt,
        Self::Le,
        Self::Ge,
        Self::Eq,
        Self::Ne,
        Self::StrictEq,
        Self::StrictNe,
    ];

    /// Numeric token used by the compiler.  Slot 30 is reserved.
    pub fn from_token(token: i32) -> Option<Self> {
        match token {
            29 => Some(Self::Lt),
            31 => Some(Self::Gt),
            32 => Some(Self::Le),
            33 => Some(Self::Ge),
            34 => Some(Self::Eq),
            35 => Some(Self::Ne),
            36 => Some(Self::StrictEq),
            37 => Some(Self::StrictNe),
            _ => None,
        }
    }

    pub fn token(self) -> i32 {
        match self {
            Self::Lt => 29,
            Self::Gt => 31,
            Self::Le => 32,
            Self::Ge => 33,
            Self::Eq => 34,
            Self::Ne => 35,
            Self::StrictEq => 36,
            Self::StrictNe => 37,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::StrictEq => "===",
            Self::StrictNe => "!==",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::StrictEq | Self::StrictNe)
    }

    /// `!=` and `!==`.
    pub fn is_negated(self) -> bool {
        matches!(self, Self::Ne | Self::StrictNe)
    }

    /// The operator whose result this one negates, if any.
    pub fn negation(self) -> Option<Self> {
        match self {
            Self::Eq => Some(Self::Ne),
            Self::Ne => Some(Self::Eq),
            Self::StrictEq => Some(Self::StrictNe),
            Self::StrictNe => Some(Self::StrictEq),
            _ => None,
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Lt => ordering == Ordering::Less,
            Self::Gt => ordering == Ordering::Greater,
            Self::Le => ordering != Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Eq | Self::StrictEq => ordering == Ordering::Equal,
            Self::Ne | Self::StrictNe => ordering != Ordering::Equal,
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpRoute {
    /// Same kind: the engine's own comparison for that kind.
    Native,
    /// Exactly one side is `undefined`: unequal, never ordered.
    UndefinedSide,
    /// Identity of the static objects behind the references, after
    /// unwrapping interface wrappers, for every operator.  A `null` side
    /// has no identity.
    ExtRefIdentity,
    /// Kinds differ and at least one side is a plain dynamic value.
    KindMismatch,
}

/// Decides how two operands of the given kinds are compared.
pub fn route(lhs: DynKind, rhs: DynKind) -> CmpRoute {
    let extref_or_null = |k: DynKind| k.is_extref() || k == DynKind::Null;
    if lhs == rhs {
        if lhs.is_extref() {
            CmpRoute::ExtRefIdentity
        } else {
            CmpRoute::Native
        }
    } else if lhs == DynKind::Undefined || rhs == DynKind::Undefined {
        CmpRoute::UndefinedSide
    } else if extref_or_null(lhs) && extref_or_null(rhs) {
        CmpRoute::ExtRefIdentity
    } else {
        CmpRoute::KindMismatch
    }
}

impl Context {
    /// `lhs <op> rhs`.  Stale handles fail with `Exception`.
    pub fn cmp(&mut self, lhs: Value, rhs: Value, op: CmpOperator) -> Result<bool, BridgeError> {
        let l = self.value(lhs)?;
        let r = self.value(rhs)?;
        let (kl, kr) = (self.kind_of(&l), self.kind_of(&r));
        let positive = match op.negation() {
            Some(base) if op.is_negated() => base,
            _ => op,
        };
        let result = match route(kl, kr) {
            CmpRoute::Native => native_compare(&l, &r, positive),
            CmpRoute::UndefinedSide | CmpRoute::KindMismatch => false,
            // Every operator reads as identity here, ordering included.
            CmpRoute::ExtRefIdentity => self.same_static_identity(&l, &r),
        };
        Ok(if op.is_negated() { !result } else { result })
    }

    /// [`Context::cmp`] with the compiler's numeric operator token.
    pub fn cmp_token(&mut self, lhs: Value, rhs: Value, token: i32) -> Result<bool, BridgeError> {
        let op = CmpOperator::from_token(token)
            .ok_or_else(|| BridgeError::type_error(format!("unknown comparison operator token {token}")))?;
        self.cmp(lhs, rhs, op)
    }

    fn static_identity(&self, value: &JsValue) -> Option<ResolvedRef> {
        let payload = self.extref_payload(value)?;
        Some(resolve_identity(
            self.static_heap.as_deref(),
            self.shapes.as_ref(),
            &payload,
        ))
    }

    fn same_static_identity(&self, l: &JsValue, r: &JsValue) -> bool {
        match (self.static_identity(l), self.static_identity(r)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Same-kind comparison of two engine values.  Relational operators on
/// objects, functions, symbols and `undefined` are always false.
fn native_compare(l: &JsValue, r: &JsValue, op: CmpOperator) -> bool {
    let ordering = match (l, r) {
        (JsValue::Number(a), JsValue::Number(b)) => a.partial_cmp(b),
        (JsValue::Str(a), JsValue::Str(b)) => Some(a.encode_utf16().cmp(b.encode_utf16())),
        (JsValue::Bool(a), JsValue::Bool(b)) => Some(a.cmp(b)),
        (JsValue::BigInt(a), JsValue::BigInt(b)) => Some(a.cmp(b)),
        (JsValue::Null, JsValue::Null) => Some(Ordering::Equal),
        (JsValue::Undefined, JsValue::Undefined) => {
            return op.is_equality();
        }
        (JsValue::Symbol(a), JsValue::Symbol(b)) => {
            return op.is_equality() && a == b;
        }
        (JsValue::Object(a), JsValue::Object(b)) => {
            return op.is_equality() && a == b;
        }
        _ => None,
    };
    ordering.is_some_and(|o| op.accepts(o))
}
