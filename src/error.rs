use aws_sdk_dynamodb::error::BuildError;
use aws_sdk_dynamodb::operation::batch_get_item::BatchGetItemError;
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use serde_dynamo::Error as SerdeDynamoError;
use std::error::Error as StdError;
use std::fmt;

type DynamoPutError = SdkError<PutItemError, Response>;
type DynamoUpdateError = SdkError<UpdateItemError, Response>;
type DynamoGetError = SdkError<GetItemError, Response>;
type DynamoQueryError = SdkError<QueryError, Response>;
type DynamoScanError = SdkError<ScanError, Response>;
type DynamoDeleteItemError = SdkError<DeleteItemError, Response>;
type DynamoCreateTableError = SdkError<CreateTableError, Response>;
type DynamoBatchWriteItemError = SdkError<BatchWriteItemError, Response>;
type DynamoBatchGetItemError = SdkError<BatchGetItemError, Response>;

/// The stage of a mapper call that produced an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// The record type's schema declaration is invalid
    Classification,
    /// Composing expressions or the request itself failed; nothing was sent
    Build,
    /// The store (or the transport to it) rejected the request
    Dispatch,
    /// A store response or an opaque token could not be decoded
    Decode,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Classification => "classification",
            Phase::Build => "build",
            Phase::Dispatch => "dispatch",
            Phase::Decode => "decode",
        };
        f.write_str(name)
    }
}

/// Mapper operation error
#[derive(Debug)]
pub enum Error {
    /// The record type could not be classified into a schema
    Schema {
        /// Rust type name of the record
        type_name: &'static str,
        /// What was wrong with the declaration
        reason: String,
    },
    /// An expression could not be rendered (empty path, empty operand list, ...)
    Expression(String),
    /// The request options are inconsistent with the record's schema
    Request(String),
    /// Items passed to one batch call target different tables
    MixedTables {
        /// Position of the first offending item
        index: usize,
        /// Table of the first item
        expected: String,
        /// Table of the offending item
        found: String,
    },
    /// Serde DynamoDB serialization error while marshaling a record or value
    SerdeDynamo(SerdeDynamoError),
    /// Serde DynamoDB deserialization error while reading a store response
    Unmarshal(SerdeDynamoError),
    /// DynamoDB request builder error
    BuildError(BuildError),
    /// Opaque token could not be encoded or decoded
    Token(String),
    /// DynamoDB PutItem operation error
    DynamoPutError(DynamoPutError),
    /// DynamoDB GetItem operation error
    DynamoGetError(DynamoGetError),
    /// DynamoDB Query operation error
    DynamoQueryError(DynamoQueryError),
    /// DynamoDB Scan operation error
    DynamoScanError(DynamoScanError),
    /// DynamoDB UpdateItem operation error
    DynamoUpdateError(DynamoUpdateError),
    /// DynamoDB DeleteItem operation error
    DynamoDeleteItemError(DynamoDeleteItemError),
    /// DynamoDB CreateTable operation error
    DynamoCreateTableError(DynamoCreateTableError),
    /// DynamoDB BatchWriteItem operation error
    DynamoBatchWriteItemError(DynamoBatchWriteItemError),
    /// DynamoDB BatchGetItem operation error
    DynamoBatchGetItemError(DynamoBatchGetItemError),
}

impl Error {
    pub(crate) fn schema(type_name: &'static str, reason: impl Into<String>) -> Self {
        Error::Schema {
            type_name,
            reason: reason.into(),
        }
    }

    /// Which stage of the call produced this error
    pub fn phase(&self) -> Phase {
        match self {
            Error::Schema { .. } => Phase::Classification,
            Error::Expression(_)
            | Error::Request(_)
            | Error::MixedTables { .. }
            | Error::SerdeDynamo(_)
            | Error::BuildError(_) => Phase::Build,
            Error::Unmarshal(_) | Error::Token(_) => Phase::Decode,
            Error::DynamoPutError(_)
            | Error::DynamoGetError(_)
            | Error::DynamoQueryError(_)
            | Error::DynamoScanError(_)
            | Error::DynamoUpdateError(_)
            | Error::DynamoDeleteItemError(_)
            | Error::DynamoCreateTableError(_)
            | Error::DynamoBatchWriteItemError(_)
            | Error::DynamoBatchGetItemError(_) => Phase::Dispatch,
        }
    }

    /// Check if the error is a DynamoDB ConditionalCheckFailedException
    ///
    /// This is how optimistic locking failures surface from Put, Update and Delete.
    /// It is an expected outcome under concurrent writers: re-read the record and
    /// retry, or give up.
    ///
    /// # Example
    /// ```no_run
    /// # use dynamo_mapper::Error;
    /// # async fn example(error: Error) {
    /// if error.is_conditional_check_failed() {
    ///     println!("Item was modified by another process");
    /// }
    /// # }
    /// ```
    pub fn is_conditional_check_failed(&self) -> bool {
        match self {
            Error::DynamoPutError(e) => matches!(
                e.as_service_error(),
                Some(PutItemError::ConditionalCheckFailedException(_))
            ),
            Error::DynamoUpdateError(e) => matches!(
                e.as_service_error(),
                Some(UpdateItemError::ConditionalCheckFailedException(_))
            ),
            Error::DynamoDeleteItemError(e) => matches!(
                e.as_service_error(),
                Some(DeleteItemError::ConditionalCheckFailedException(_))
            ),
            _ => false,
        }
    }

    /// Check if the error is a serialization/deserialization error
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Error::SerdeDynamo(_) | Error::Unmarshal(_))
    }

    /// Check if the error came back from a DynamoDB call
    pub fn is_dynamodb_error(&self) -> bool {
        self.phase() == Phase::Dispatch
    }
}

macro_rules! impl_from_error {
    ($name:ident, $variant:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$variant(e)
            }
        }
    };
    ($name:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$name(e)
            }
        }
    };
}

impl_from_error!(SerdeDynamoError, SerdeDynamo);
impl_from_error!(BuildError);
impl_from_error!(DynamoPutError);
impl_from_error!(DynamoGetError);
impl_from_error!(DynamoUpdateError);
impl_from_error!(DynamoQueryError);
impl_from_error!(DynamoScanError);
impl_from_error!(DynamoDeleteItemError);
impl_from_error!(DynamoCreateTableError);
impl_from_error!(DynamoBatchWriteItemError);
impl_from_error!(DynamoBatchGetItemError);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Schema { type_name, reason } => {
                write!(f, "invalid schema for type \"{type_name}\": {reason}")
            }
            Error::Expression(reason) => write!(f, "build expression error: {reason}"),
            Error::Request(reason) => write!(f, "invalid request: {reason}"),
            Error::MixedTables {
                index,
                expected,
                found,
            } => write!(
                f,
                "item at index {index} has different table name ({found}) instead of {expected}"
            ),
            Error::SerdeDynamo(e) => write!(f, "DynamoDB serialization error: {}", e),
            Error::Unmarshal(e) => write!(f, "DynamoDB deserialization error: {}", e),
            Error::BuildError(e) => write!(f, "DynamoDB request builder error: {}", e),
            Error::Token(reason) => write!(f, "opaque token error: {reason}"),
            Error::DynamoPutError(e) => {
                write!(f, "DynamoDB PutItem operation failed: {}", e)
            }
            Error::DynamoGetError(e) => {
                write!(f, "DynamoDB GetItem operation failed: {}", e)
            }
            Error::DynamoQueryError(e) => {
                write!(f, "DynamoDB Query operation failed: {}", e)
            }
            Error::DynamoScanError(e) => {
                write!(f, "DynamoDB Scan operation failed: {}", e)
            }
            Error::DynamoUpdateError(e) => {
                write!(f, "DynamoDB UpdateItem operation failed: {}", e)
            }
            Error::DynamoDeleteItemError(e) => {
                write!(f, "DynamoDB DeleteItem operation failed: {}", e)
            }
            Error::DynamoCreateTableError(e) => {
                write!(f, "DynamoDB CreateTable operation failed: {}", e)
            }
            Error::DynamoBatchWriteItemError(e) => {
                write!(f, "DynamoDB BatchWriteItem operation failed: {}", e)
            }
            Error::DynamoBatchGetItemError(e) => {
                write!(f, "DynamoDB BatchGetItem operation failed: {}", e)
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::SerdeDynamo(e) | Error::Unmarshal(e) => Some(e),
            Error::BuildError(e) => Some(e),
            Error::DynamoPutError(e) => Some(e),
            Error::DynamoGetError(e) => Some(e),
            Error::DynamoQueryError(e) => Some(e),
            Error::DynamoScanError(e) => Some(e),
            Error::DynamoUpdateError(e) => Some(e),
            Error::DynamoDeleteItemError(e) => Some(e),
            Error::DynamoCreateTableError(e) => Some(e),
            Error::DynamoBatchWriteItemError(e) => Some(e),
            Error::DynamoBatchGetItemError(e) => Some(e),
            _ => None,
        }
    }
}
