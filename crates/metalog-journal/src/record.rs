//! Operation records written to the journal.
//!
//! Each record carries a transaction id, an operation kind and the kind's
//! parameters. On disk a record is one JSON object per line:
//!
//! ```json
//! {"transId":1,"type":"CREATE_FILE","parameters":{"recursive":false,"path":"/a","directory":false,"blockSizeByte":512,"creationTimeMs":1000}}
//! ```
//!
//! Byte-sequence parameters are base64 strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TransactionId;

/// Kind of a journaled metadata operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    /// A block was added to a file.
    AddBlock,
    /// A file was checkpointed to the under storage.
    AddCheckpoint,
    /// A file or directory was created.
    CreateFile,
    /// A file was completed.
    CompleteFile,
    /// A file's pinned flag changed.
    SetPinned,
    /// A file was renamed.
    Rename,
    /// A file was deleted.
    Delete,
    /// A raw table was created.
    CreateRawTable,
    /// A raw table's metadata was replaced.
    UpdateRawTableMetadata,
    /// A lineage dependency was registered.
    CreateDependency,
}

impl OperationType {
    /// Every operation kind, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::AddBlock,
        Self::AddCheckpoint,
        Self::CreateFile,
        Self::CompleteFile,
        Self::SetPinned,
        Self::Rename,
        Self::Delete,
        Self::CreateRawTable,
        Self::UpdateRawTableMetadata,
        Self::CreateDependency,
    ];

    /// Returns the on-disk name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AddBlock => "ADD_BLOCK",
            Self::AddCheckpoint => "ADD_CHECKPOINT",
            Self::CreateFile => "CREATE_FILE",
            Self::CompleteFile => "COMPLETE_FILE",
            Self::SetPinned => "SET_PINNED",
            Self::Rename => "RENAME",
            Self::Delete => "DELETE",
            Self::CreateRawTable => "CREATE_RAW_TABLE",
            Self::UpdateRawTableMetadata => "UPDATE_RAW_TABLE_METADATA",
            Self::CreateDependency => "CREATE_DEPENDENCY",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a lineage dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyType {
    /// Children depend on every parent.
    Wide,
    /// Each child depends on one parent.
    Narrow,
}

/// Parameters of a `CREATE_DEPENDENCY` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRecord {
    /// Ids of the input files.
    pub parents: Vec<i32>,
    /// Ids of the output files.
    pub children: Vec<i32>,
    /// Command prefix used for recomputation.
    pub command_prefix: String,
    /// Opaque data used for recomputation.
    #[serde(with = "base64_list")]
    pub data: Vec<Vec<u8>>,
    /// Free-form comment.
    pub comment: String,
    /// Framework that produced the outputs.
    pub framework: String,
    /// Framework version.
    pub framework_version: String,
    /// Dependency shape.
    pub dependency_type: DependencyType,
    /// Id assigned to the dependency.
    pub dependency_id: i32,
    /// Creation time in milliseconds since the epoch.
    pub creation_time_ms: i64,
}

/// A metadata operation together with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// A block was added to a file.
    #[serde(rename_all = "camelCase")]
    AddBlock {
        /// File id.
        file_id: i32,
        /// Index of the new block within the file.
        block_index: i32,
        /// Length of the new block in bytes.
        block_length: i64,
        /// Operation time in milliseconds.
        op_time_ms: i64,
    },

    /// A file was checkpointed.
    #[serde(rename_all = "camelCase")]
    AddCheckpoint {
        /// File id.
        file_id: i32,
        /// Length of the checkpointed file.
        length: i64,
        /// Location of the checkpoint.
        path: String,
        /// Operation time in milliseconds.
        op_time_ms: i64,
    },

    /// A file or directory was created.
    #[serde(rename_all = "camelCase")]
    CreateFile {
        /// Create missing ancestors.
        recursive: bool,
        /// Path of the new inode.
        path: String,
        /// Create a directory instead of a file.
        directory: bool,
        /// Block size for files.
        block_size_byte: i64,
        /// Creation time in milliseconds.
        creation_time_ms: i64,
    },

    /// A file was completed.
    #[serde(rename_all = "camelCase")]
    CompleteFile {
        /// File id.
        file_id: i32,
        /// Operation time in milliseconds.
        op_time_ms: i64,
    },

    /// A file's pinned flag changed.
    #[serde(rename_all = "camelCase")]
    SetPinned {
        /// File id.
        file_id: i32,
        /// New pinned flag.
        pinned: bool,
        /// Operation time in milliseconds.
        op_time_ms: i64,
    },

    /// A file was renamed.
    #[serde(rename_all = "camelCase")]
    Rename {
        /// File id.
        file_id: i32,
        /// Destination path.
        dst_path: String,
        /// Operation time in milliseconds.
        op_time_ms: i64,
    },

    /// A file was deleted.
    #[serde(rename_all = "camelCase")]
    Delete {
        /// File id.
        file_id: i32,
        /// Delete children of a directory.
        recursive: bool,
        /// Operation time in milliseconds.
        op_time_ms: i64,
    },

    /// A raw table was created.
    #[serde(rename_all = "camelCase")]
    CreateRawTable {
        /// Table id.
        table_id: i32,
        /// Number of columns.
        columns: i32,
        /// Opaque table metadata.
        #[serde(with = "base64_bytes")]
        metadata: Vec<u8>,
    },

    /// A raw table's metadata was replaced.
    #[serde(rename_all = "camelCase")]
    UpdateRawTableMetadata {
        /// Table id.
        table_id: i32,
        /// New opaque table metadata.
        #[serde(with = "base64_bytes")]
        metadata: Vec<u8>,
    },

    /// A lineage dependency was registered.
    CreateDependency(DependencyRecord),
}

impl Operation {
    /// Returns the kind of this operation.
    #[must_use]
    pub const fn op_type(&self) -> OperationType {
        match self {
            Self::AddBlock { .. } => OperationType::AddBlock,
            Self::AddCheckpoint { .. } => OperationType::AddCheckpoint,
            Self::CreateFile { .. } => OperationType::CreateFile,
            Self::CompleteFile { .. } => OperationType::CompleteFile,
            Self::SetPinned { .. } => OperationType::SetPinned,
            Self::Rename { .. } => OperationType::Rename,
            Self::Delete { .. } => OperationType::Delete,
            Self::CreateRawTable { .. } => OperationType::CreateRawTable,
            Self::UpdateRawTableMetadata { .. } => OperationType::UpdateRawTableMetadata,
            Self::CreateDependency(_) => OperationType::CreateDependency,
        }
    }

    /// Returns the file id this operation targets, if any.
    #[must_use]
    pub const fn file_id(&self) -> Option<i32> {
        match self {
            Self::AddBlock { file_id, .. }
            | Self::AddCheckpoint { file_id, .. }
            | Self::CompleteFile { file_id, .. }
            | Self::SetPinned { file_id, .. }
            | Self::Rename { file_id, .. }
            | Self::Delete { file_id, .. } => Some(*file_id),
            Self::CreateFile { .. }
            | Self::CreateRawTable { .. }
            | Self::UpdateRawTableMetadata { .. }
            | Self::CreateDependency(_) => None,
        }
    }
}

/// A journaled operation with its transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Transaction id (strictly increasing across the journal).
    #[serde(rename = "transId")]
    pub transaction_id: TransactionId,
    /// The operation and its parameters.
    #[serde(flatten)]
    pub operation: Operation,
}

impl OperationRecord {
    /// Create a record.
    #[must_use]
    pub fn new(transaction_id: TransactionId, operation: Operation) -> Self {
        Self { transaction_id, operation }
    }

    /// Returns the kind of the recorded operation.
    #[must_use]
    pub const fn op_type(&self) -> OperationType {
        self.operation.op_type()
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(de::Error::custom)
    }
}

mod base64_list {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(list: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(list.iter().map(|bytes| STANDARD.encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|item| STANDARD.decode(item.as_bytes()).map_err(de::Error::custom))
            .collect()
    }
}
