//! Canonical error type for all Inspr core operations.
//!
//! Mirrors the closed error taxonomy of spec §7: every entity manager, the diff engine,
//! and the reactor framework return `Result<T, InsprError>`. `Kind` is a bitmask so a
//! `MultiError`'s kind can be the bitwise OR of its members, matching the way `Change`
//! and `Difference` kinds compose in [`crate::diff`].

use std::fmt;
use thiserror::Error;

/// Bitmask over the closed set of error kinds (spec §7).
///
/// Kept as a bitmask (rather than a plain enum discriminant) so that a [`MultiError`]
/// can summarize the kinds of all the errors it wraps with a single OR.
pub type Kind = u16;

pub const NOT_FOUND: Kind = 1 << 0;
pub const ALREADY_EXISTS: Kind = 1 << 1;
pub const BAD_REQUEST: Kind = 1 << 2;
pub const INVALID_NAME: Kind = 1 << 3;
pub const INVALID_APP: Kind = 1 << 4;
pub const INVALID_CHANNEL: Kind = 1 << 5;
pub const INVALID_TYPE: Kind = 1 << 6;
pub const INVALID_ALIAS: Kind = 1 << 7;
pub const INTERNAL_SERVER: Kind = 1 << 8;
pub const UNAUTHORIZED: Kind = 1 << 9;
pub const FORBIDDEN: Kind = 1 << 10;
pub const INVALID_TOKEN: Kind = 1 << 11;
pub const EXPIRED_TOKEN: Kind = 1 << 12;

/// Canonical error type for Inspr core operations.
///
/// Each variant is one of the closed kinds in spec §7. `source` carries an optional
/// wrapped cause without widening the type to `Box<dyn Error>` for every variant.
#[derive(Error, Debug)]
pub enum InsprError {
    #[error("not found: {message}")]
    NotFound {
        message: String,
        #[source]
        source: Option<Box<InsprError>>,
    },
    #[error("already exists: {message}")]
    AlreadyExists {
        message: String,
        #[source]
        source: Option<Box<InsprError>>,
    },
    #[error("bad request: {message}")]
    BadRequest {
        message: String,
        #[source]
        source: Option<Box<InsprError>>,
    },
    #[error("invalid name: {message}")]
    InvalidName {
        message: String,
        #[source]
        source: Option<Box<InsprError>>,
    },
    #[error("invalid app: {message}")]
    InvalidApp {
        message: String,
        #[source]
        source: Option<Box<InsprError>>,
    },
    #[error("invalid channel: {message}")]
    InvalidChannel {
        message: String,
        #[source]
        source: Option<Box<InsprError>>,
    },
    #[error("invalid type: {message}")]
    InvalidType {
        message: String,
        #[source]
        source: Option<Box<InsprError>>,
    },
    #[error("invalid alias: {message}")]
    InvalidAlias {
        message: String,
        #[source]
        source: Option<Box<InsprError>>,
    },
    #[error("internal server error: {message}")]
    InternalServer {
        message: String,
        #[source]
        source: Option<Box<InsprError>>,
    },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String },
    #[error("invalid token: {message}")]
    InvalidToken { message: String },
    #[error("expired token: {message}")]
    ExpiredToken { message: String },
}

macro_rules! simple_ctor {
    ($fn_name:ident, $variant:ident) => {
        pub fn $fn_name(message: impl Into<String>) -> Self {
            InsprError::$variant {
                message: message.into(),
                source: None,
            }
        }
    };
}

impl InsprError {
    simple_ctor!(not_found, NotFound);
    simple_ctor!(already_exists, AlreadyExists);
    simple_ctor!(bad_request, BadRequest);
    simple_ctor!(invalid_name, InvalidName);
    simple_ctor!(invalid_app, InvalidApp);
    simple_ctor!(invalid_channel, InvalidChannel);
    simple_ctor!(invalid_type, InvalidType);
    simple_ctor!(invalid_alias, InvalidAlias);
    simple_ctor!(internal_server, InternalServer);

    pub fn unauthorized(message: impl Into<String>) -> Self {
        InsprError::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        InsprError::Forbidden {
            message: message.into(),
        }
    }

    /// Bitmask kind of this error, per spec §7's closed taxonomy.
    pub fn kind(&self) -> Kind {
        match self {
            InsprError::NotFound { .. } => NOT_FOUND,
            InsprError::AlreadyExists { .. } => ALREADY_EXISTS,
            InsprError::BadRequest { .. } => BAD_REQUEST,
            InsprError::InvalidName { .. } => INVALID_NAME,
            InsprError::InvalidApp { .. } => INVALID_APP,
            InsprError::InvalidChannel { .. } => INVALID_CHANNEL,
            InsprError::InvalidType { .. } => INVALID_TYPE,
            InsprError::InvalidAlias { .. } => INVALID_ALIAS,
            InsprError::InternalServer { .. } => INTERNAL_SERVER,
            InsprError::Unauthorized { .. } => UNAUTHORIZED,
            InsprError::Forbidden { .. } => FORBIDDEN,
            InsprError::InvalidToken { .. } => INVALID_TOKEN,
            InsprError::ExpiredToken { .. } => EXPIRED_TOKEN,
        }
    }

    pub fn has_kind(&self, kind: Kind) -> bool {
        self.kind() & kind != 0
    }
}

/// Wraps a list of kinded errors produced while applying several independent checks
/// (structural validation, reactor application). Its kind is the bitwise OR of its
/// members', matching `Change.kind`'s aggregation rule in spec §4.C.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<InsprError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: InsprError) {
        self.errors.push(err);
    }

    pub fn extend(&mut self, errs: impl IntoIterator<Item = InsprError>) {
        self.errors.extend(errs);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[InsprError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<InsprError> {
        self.errors
    }

    pub fn kind(&self) -> Kind {
        self.errors.iter().fold(0, |acc, e| acc | e.kind())
    }

    /// Returns `Ok(())` if empty, otherwise `Err(self)`. The idiom used throughout the
    /// entity managers and validation passes to turn an accumulator into a `Result`.
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl From<InsprError> for MultiError {
    fn from(err: InsprError) -> Self {
        MultiError {
            errors: vec![err],
        }
    }
}
