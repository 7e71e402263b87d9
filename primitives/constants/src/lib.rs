#![cfg_attr(not(feature = "std"), no_std)]

/// Number of bytes in a tebibyte. Storage prices are quoted per TiB.
pub const TIB_IN_BYTES: u64 = 2u64.pow(40);

/// Size of a leaf of a piece's Merkle tree, in bytes. Leaf counts reported by the proof
/// verifier are converted to bytes with it.
pub const BYTES_PER_LEAF: u64 = 32;

/// Filecoin produces an epoch every 30 seconds.
pub const EPOCHS_PER_DAY: u32 = 2880;

/// Epochs in a (30 day) month. Monthly prices are converted to per-epoch rates with it.
pub const EPOCHS_PER_MONTH: u32 = EPOCHS_PER_DAY * 30;

/// Number of epochs of payment that stay locked from the payer's funds for every rail.
pub const DEFAULT_LOCKUP_PERIOD: u32 = EPOCHS_PER_DAY * 10;

/// Minimum number of challenges a proof has to answer.
pub const CHALLENGES_PER_PROOF: u32 = 5;

/// Denominator of commission rates expressed in basis points.
pub const COMMISSION_MAX_BPS: u16 = 10_000;

/// Maximum byte length of a metadata key.
pub const MAX_METADATA_KEY_LENGTH: u32 = 32;

/// Maximum byte length of a metadata value.
pub const MAX_METADATA_VALUE_LENGTH: u32 = 128;

/// Maximum number of metadata keys a data set can have.
pub const MAX_KEYS_PER_DATA_SET: u32 = 10;

/// Maximum number of metadata keys a piece can have.
pub const MAX_KEYS_PER_PIECE: u32 = 5;

/// Data set metadata key whose presence requests CDN service. Its value is ignored.
pub const WITH_CDN_METADATA_KEY: &[u8] = b"withCDN";

/// Name of the signing domain of the warm storage service.
pub const SIGNING_DOMAIN_NAME: &[u8] = b"WarmStorageService";

/// Version of the signing domain of the warm storage service.
pub const SIGNING_DOMAIN_VERSION: &[u8] = b"1";
