//! Reader and writer for PopCap `1bsr` resource bundles.
//!
//! A bundle groups subgroups, each carrying one `pgsr` packet of resources,
//! behind a set of id tables, fixed-size records and an optional manifest.
//! [`codec`] works on streams, [`process`] on unpacked directories.

pub mod codec;
pub mod compress;
pub mod error;
pub mod header;
pub mod manifest;
pub mod packet;
pub mod path_table;
pub mod pool;
pub mod process;
pub mod string_blob;
pub mod types;

pub use codec::{BundleReader, PacketFailurePolicy, UnpackMode, UnpackOptions, pack, unpack};
pub use compress::{Compressor, ZlibCompressor};
pub use error::{ConsistencyError, FormatError, Result, RsbError, TrieError};
pub use manifest::Manifest;
pub use packet::Packet;
pub use process::{pack_bundle, unpack_bundle};
pub use types::{Bundle, Group, Subgroup, TextureDescriptor};
