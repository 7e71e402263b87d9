//! Various types to use in the Warm Storage pallet.

use super::*;
use codec::{Decode, Encode, MaxEncodedLen};
use frame_support::pallet_prelude::*;
use frame_system::pallet_prelude::BlockNumberFor;
use scale_info::{prelude::vec::Vec, TypeInfo};
use wsp_traits::{PaymentRailsInterface, ServiceProviderRegistryInterface};

/// Identifier the proof verifier assigns to a data set.
pub type DataSetId = u64;

/// Identifier of a piece inside a data set. Pieces are numbered from zero in insertion order.
pub type PieceId = u64;

/// Client-chosen nonce of a data set, unique per payer.
pub type ClientDataSetId = u64;

/// Index of a proving period, counted from the data set's activation epoch.
pub type PeriodIndex = u64;

/// Structure that has the information of a data set stored by the service.
///
/// The record is written at creation and only its `service_provider` (on reassignment) and
/// `payment_end_epoch` (on termination) change afterwards.
#[derive(
    Encode,
    Decode,
    MaxEncodedLen,
    TypeInfo,
    CloneNoBound,
    PartialEqNoBound,
    EqNoBound,
    RuntimeDebugNoBound,
)]
#[scale_info(skip_type_params(T))]
pub struct DataSetInfo<T: Config> {
    /// Client account paying for the data set's rails.
    pub payer: T::AccountId,
    /// Current service provider of record of the data set.
    pub service_provider: T::AccountId,
    /// Beneficiary of the PDP rail, resolved from the registry at creation.
    pub payee: T::AccountId,
    /// Registry ID of the Provider that created the data set.
    pub provider_id: ProviderIdFor<T>,
    /// Nonce chosen by the client for this data set.
    pub client_data_set_id: ClientDataSetId,
    /// Rail paying the Provider for proven storage.
    pub pdp_rail_id: RailIdFor<T>,
    /// Cache-miss and CDN rails, present only if CDN service was requested.
    pub cdn_rails: Option<CdnRails<RailIdFor<T>>>,
    /// Last epoch the rails pay for. `None` while the data set is active.
    pub payment_end_epoch: Option<BlockNumberFor<T>>,
}

/// The pair of rails created for a data set with CDN service. Either both exist or none does.
#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone, Copy)]
pub struct CdnRails<RailId> {
    /// Rail paying the Provider for data retrieved on cache misses.
    pub cache_miss_rail_id: RailId,
    /// Rail paying the CDN beneficiary.
    pub cdn_rail_id: RailId,
}

/// Proving bookkeeping of a data set, created by its first `next_proving_period` callback.
#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct ProvingState<BlockNumber> {
    /// Epoch at which proving started. Proving periods are counted from it.
    pub activation_epoch: BlockNumber,
    /// Deadline of the current proving period. `None` while the data set is parked
    /// (empty, no challenge scheduled).
    pub deadline: Option<BlockNumber>,
    /// Whether a valid proof was submitted for the current proving period.
    pub proven_this_period: bool,
}

/// Proving period parameters of the service.
#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone, Copy)]
pub struct PdpConfig<BlockNumber> {
    /// Length of a proving period, in epochs.
    pub max_proving_period: BlockNumber,
    /// Length of the challenge window closing each proving period, in epochs.
    pub challenge_window_size: BlockNumber,
}

/// Payload the proof verifier forwards with `data_set_created`.
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct DataSetCreatePayload<AccountId> {
    pub payer: AccountId,
    pub client_data_set_id: ClientDataSetId,
    pub metadata_keys: Vec<Vec<u8>>,
    pub metadata_values: Vec<Vec<u8>>,
    pub signature: Vec<u8>,
}

/// Payload the proof verifier forwards with `pieces_added`.
///
/// The outer metadata lists hold one entry per added piece.
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct PiecesAddedPayload {
    pub signature: Vec<u8>,
    pub metadata_keys: Vec<Vec<Vec<u8>>>,
    pub metadata_values: Vec<Vec<Vec<u8>>>,
}

/// Payload the proof verifier forwards with `pieces_scheduled_remove`.
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct PiecesRemovePayload {
    pub signature: Vec<u8>,
}

/// Metadata entries in the canonical form they are signed in.
pub type MetadataPairs = Vec<(Vec<u8>, Vec<u8>)>;

/// An operation a payer authorizes with its signature.
///
/// The SCALE encoding of this enum is the signed message, so the variant index doubles as the
/// operation tag and variants must never be reordered.
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub enum AuthorizedOperation<AccountId> {
    CreateDataSet {
        client_data_set_id: ClientDataSetId,
        payee: AccountId,
        metadata: MetadataPairs,
    },
    AddPieces {
        client_data_set_id: ClientDataSetId,
        first_added: PieceId,
        piece_cids: Vec<Vec<u8>>,
        metadata: Vec<MetadataPairs>,
    },
    SchedulePieceRemovals {
        client_data_set_id: ClientDataSetId,
        piece_ids: Vec<PieceId>,
    },
}

/// The scope a set of metadata entries belongs to.
#[derive(RuntimeDebug, PartialEq, Eq, Clone, Copy)]
pub enum MetadataScope {
    DataSet(DataSetId),
    Piece(DataSetId, PieceId),
}

// Type aliases:

/// Syntactic sugar for the ProviderId type of the service-provider registry.
pub type ProviderIdFor<T> =
    <<T as crate::Config>::Registry as ServiceProviderRegistryInterface>::ProviderId;

/// Syntactic sugar for the RailId type of the payments ledger.
pub type RailIdFor<T> = <<T as crate::Config>::PaymentRails as PaymentRailsInterface>::RailId;

/// BalanceOf is the balance type of the payments ledger.
pub type BalanceOf<T> = <<T as crate::Config>::PaymentRails as PaymentRailsInterface>::Balance;

/// A metadata key, bounded by `MaxMetadataKeyLength`.
pub type MetadataKey<T> = BoundedVec<u8, <T as crate::Config>::MaxMetadataKeyLength>;

/// A metadata value, bounded by `MaxMetadataValueLength`.
pub type MetadataValue<T> = BoundedVec<u8, <T as crate::Config>::MaxMetadataValueLength>;

/// Insertion-ordered keys of a data set's metadata.
pub type DataSetMetadataKeysFor<T> =
    BoundedVec<MetadataKey<T>, <T as crate::Config>::MaxDataSetMetadataKeys>;

/// Insertion-ordered keys of a piece's metadata.
pub type PieceMetadataKeysFor<T> =
    BoundedVec<MetadataKey<T>, <T as crate::Config>::MaxPieceMetadataKeys>;

/// The content identifier of a piece, bounded by `MaxPieceCidLength`.
pub type PieceCid<T> = BoundedVec<u8, <T as crate::Config>::MaxPieceCidLength>;

/// The list of approved Provider IDs.
pub type ApprovedProvidersFor<T> =
    BoundedVec<ProviderIdFor<T>, <T as crate::Config>::MaxApprovedProviders>;

/// Proving state of a data set, in the runtime's block number.
pub type ProvingStateFor<T> = ProvingState<BlockNumberFor<T>>;

/// Proving period configuration, in the runtime's block number.
pub type PdpConfigFor<T> = PdpConfig<BlockNumberFor<T>>;
