//! Repository error types
//!
//! Every repository call fails with a [`RepositoryError`] whose `kind`
//! callers can branch on. Errors wrap at most one inner error (for example
//! `IneffectiveOperation` wrapping `EmptyInput`), reachable through
//! [`RepositoryError::cause`] and `std::error::Error::source`.
//!
//! # Example
//!
//! ```rust
//! use kbase::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::ineffective(
//!     RepositoryOperation::Add,
//!     RepositoryError::empty_input(RepositoryOperation::Add),
//! );
//! assert_eq!(error.kind, RepositoryErrorKind::IneffectiveOperation);
//! assert_eq!(error.cause().map(|e| e.kind), Some(RepositoryErrorKind::EmptyInput));
//! ```

use std::fmt;
use std::time::Duration;

use crate::error::DatabaseError;
use crate::expression::ExpressionError;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    Add,
    Replace,
    Upsert,
    Update,
    UpdateWhere,
    Delete,
    DeleteWhere,
    CountAll,
    CountWhere,
    DoesExist,
    DoesExistWhere,
    GetAll,
    GetFirstWhere,
    GetWhere,
    /// Registering type names
    AddTypes,
    /// Removing type names
    DeleteTypes,
    /// Reading type names
    GetTypes,
    /// Ambiguity queries over stored tag names
    ResolveTags,
    /// Creating the schema
    Migrate,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Replace => write!(f, "replace"),
            Self::Upsert => write!(f, "upsert"),
            Self::Update => write!(f, "update"),
            Self::UpdateWhere => write!(f, "update_where"),
            Self::Delete => write!(f, "delete"),
            Self::DeleteWhere => write!(f, "delete_where"),
            Self::CountAll => write!(f, "count_all"),
            Self::CountWhere => write!(f, "count_where"),
            Self::DoesExist => write!(f, "does_exist"),
            Self::DoesExistWhere => write!(f, "does_exist_where"),
            Self::GetAll => write!(f, "get_all"),
            Self::GetFirstWhere => write!(f, "get_first_where"),
            Self::GetWhere => write!(f, "get_where"),
            Self::AddTypes => write!(f, "add_types"),
            Self::DeleteTypes => write!(f, "delete_types"),
            Self::GetTypes => write!(f, "get_types"),
            Self::ResolveTags => write!(f, "resolve_tags"),
            Self::Migrate => write!(f, "migrate"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// An element of the input collection was `None`
    NullInput,
    /// The input collection was empty
    EmptyInput,
    /// The call could not have any effect; wraps the reason
    IneffectiveOperation,
    /// A referenced tag, type or linked document does not exist
    ReferenceToNonExistentDependency,
    /// A write violated a uniqueness constraint
    DuplicateInsertion,
    /// A record-targeted update or delete matched no row
    NonExistentPrimaryData,
    /// The input is structurally invalid (e.g. a cycle in the tag tree)
    ValidationFailed,
    /// A domain value could not be converted to its storage form
    Serialization,
    /// A stored value could not be converted to its domain form
    Deserialization,
    /// A filter expression was rejected
    InvalidExpression,
    /// A registered hook failed
    Hook,
    /// The call's cancellation token fired
    Cancelled,
    /// The configured operation timeout elapsed
    Timeout,
    /// The call's deadline passed
    DeadlineExceeded,
    /// Underlying database error
    Backend,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullInput => write!(f, "null_input"),
            Self::EmptyInput => write!(f, "empty_input"),
            Self::IneffectiveOperation => write!(f, "ineffective_operation"),
            Self::ReferenceToNonExistentDependency => {
                write!(f, "reference_to_non_existent_dependency")
            }
            Self::DuplicateInsertion => write!(f, "duplicate_insertion"),
            Self::NonExistentPrimaryData => write!(f, "non_existent_primary_data"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::Serialization => write!(f, "serialization"),
            Self::Deserialization => write!(f, "deserialization"),
            Self::InvalidExpression => write!(f, "invalid_expression"),
            Self::Hook => write!(f, "hook"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Timeout => write!(f, "timeout"),
            Self::DeadlineExceeded => write!(f, "deadline_exceeded"),
            Self::Backend => write!(f, "backend"),
        }
    }
}

/// Structured repository error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of entity involved (e.g., "Tag", "Bookmark")
    pub entity_type: Option<String>,
    /// The ID (or unique key) of the entity involved
    pub entity_id: Option<String>,
    source: Option<Box<RepositoryError>>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
            source: None,
        }
    }

    /// The `index`-th input element was `None`
    pub fn null_input(operation: RepositoryOperation, index: usize) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::NullInput,
            format!("Input element {} is null", index),
        )
    }

    pub fn empty_input(operation: RepositoryOperation) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::EmptyInput,
            "Input collection is empty",
        )
    }

    /// The call had nothing to do because of `reason`
    pub fn ineffective(operation: RepositoryOperation, reason: RepositoryError) -> Self {
        Self {
            source: Some(Box::new(reason)),
            ..Self::new(
                operation,
                RepositoryErrorKind::IneffectiveOperation,
                "Operation would have no effect",
            )
        }
    }

    /// A referenced record does not exist
    ///
    /// # Example
    ///
    /// ```rust
    /// use kbase::repository::{RepositoryError, RepositoryOperation};
    ///
    /// let error = RepositoryError::missing_dependency(RepositoryOperation::Add, "Tag", "42");
    /// assert_eq!(error.entity_id.as_deref(), Some("42"));
    /// ```
    pub fn missing_dependency(
        operation: RepositoryOperation,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::ReferenceToNonExistentDependency,
            "Referenced entity does not exist",
        )
        .with_entity(entity_type, entity_id)
    }

    pub fn duplicate(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::DuplicateInsertion, message)
    }

    /// A record-targeted mutation found no row
    pub fn nonexistent(
        operation: RepositoryOperation,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::NonExistentPrimaryData,
            "Entity does not exist",
        )
        .with_entity(entity_type, entity_id)
    }

    pub fn validation_failed(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::ValidationFailed, message)
    }

    pub fn serialization(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Serialization, message)
    }

    pub fn deserialization(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Deserialization, message)
    }

    pub fn invalid_expression(operation: RepositoryOperation, error: &ExpressionError) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::InvalidExpression,
            error.to_string(),
        )
    }

    pub fn hook(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Hook, message)
    }

    pub fn cancelled(operation: RepositoryOperation) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::Cancelled,
            "Operation was cancelled",
        )
    }

    pub fn timeout(operation: RepositoryOperation, after: Duration) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::Timeout,
            format!("Operation timed out after {:?}", after),
        )
    }

    pub fn deadline_exceeded(operation: RepositoryOperation) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::DeadlineExceeded,
            "Deadline exceeded",
        )
    }

    /// Wrap a backend failure without reinterpreting it
    pub fn backend(operation: RepositoryOperation, error: &DatabaseError) -> Self {
        Self::new(operation, RepositoryErrorKind::Backend, error.to_string())
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// The wrapped error, one level down
    pub fn cause(&self) -> Option<&RepositoryError> {
        self.source.as_deref()
    }

    /// Whether the call was stopped from outside rather than failing
    pub fn is_interruption(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::Cancelled
                | RepositoryErrorKind::Timeout
                | RepositoryErrorKind::DeadlineExceeded
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(ref entity_type), Some(ref entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|inner| inner as &(dyn std::error::Error + 'static))
    }
}
