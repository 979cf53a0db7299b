//! # warden-schema
//!
//! Declared option sets for filters and actions, and the validation gate that
//! every policy entry passes before any resource is touched.
//!
//! A [`TypeSchema`] is declared once per filter/action kind:
//!
//! ```
//! use serde_json::json;
//! use warden_schema::{definitions, TypeSchema};
//!
//! let schema = TypeSchema::new("image-age")
//!     .property("op", json!({"$ref": definitions::COMPARISON_OPERATORS_REF}))
//!     .property("days", json!({"type": "number", "minimum": 0}));
//!
//! let validator = schema.compile().unwrap();
//! assert!(validator.validate(&json!({"type": "image-age", "days": 30})).is_ok());
//! assert!(validator.validate(&json!({"type": "image-age", "days": -1})).is_err());
//! ```
//!
//! Schemas compose with [`TypeSchema::inherit`] (`rinherit`): the derived
//! schema starts from the base option set and adds or overrides properties.
//! Composition happens at registration time, producing one concrete
//! [`SchemaValidator`] per registered kind.

pub mod definitions;
pub mod error;
pub mod schema;
pub mod validator;

pub use error::{SchemaErrorKind, SchemaValidationError};
pub use schema::TypeSchema;
pub use validator::SchemaValidator;
