pub mod error;
pub mod record;
pub mod schema;
pub mod codec;
pub mod container;
pub mod reindex;
pub mod convert;

pub use error::{MfError, Result};
pub use record::{Mnemonic, RecordHeader};
pub use schema::{Arity, ArraysBlock, DataType, PhaseMode, Property};
pub use codec::{BlockQuery, Column, Destination, PropertyColumn, Source};
pub use container::{
    BlockKind, FileFormat, MeshGrid, MvsDescription, MvsFile, ReadRequest, SumAttachment, SumDescription,
    SumFile,
};
pub use reindex::{Permutation, ReindexError};
pub use convert::{ConvertError, ConvertOptions};
