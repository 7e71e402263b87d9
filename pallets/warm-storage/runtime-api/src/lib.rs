#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec::Vec;
use codec::{Codec, Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;

/// Lifecycle status of a data set, derived from its payment end epoch and the current block.
#[derive(Eq, PartialEq, Encode, Decode, MaxEncodedLen, RuntimeDebug, TypeInfo, Clone, Copy)]
pub enum DataSetStatus {
    /// Payment rails are running.
    Active,
    /// Termination was requested; the rails still pay until the end epoch.
    Terminating,
    /// The payment end epoch has elapsed. No lifecycle operation is accepted anymore.
    Terminated,
}

/// Proving configuration of the service, as returned by `get_pdp_config`.
#[derive(Eq, PartialEq, Encode, Decode, MaxEncodedLen, RuntimeDebug, TypeInfo, Clone)]
pub struct PdpConfigView<BlockNumber> {
    /// Length of a proving period, in epochs.
    pub max_proving_period: BlockNumber,
    /// Length of the challenge window at the end of each proving period, in epochs.
    pub challenge_window_size: BlockNumber,
    /// Minimum number of challenges a proof has to answer.
    pub challenges_per_proof: u32,
    /// First epoch of the challenge window of a data set that started proving now.
    pub init_challenge_window_start: BlockNumber,
}

/// Metadata entry lookup result: whether the key exists and its value (empty if it does not).
pub type MetadataEntry = (bool, Vec<u8>);

/// All metadata of a scope, as parallel key and value lists in insertion order.
pub type MetadataEntries = (Vec<Vec<u8>>, Vec<Vec<u8>>);

sp_api::decl_runtime_apis! {
    #[api_version(1)]
    pub trait WarmStorageApi<DataSetId, PieceId, AccountId, ProviderId, RailId, BlockNumber, DataSetInfo, ProvingState>
    where
        DataSetId: Codec,
        PieceId: Codec,
        AccountId: Codec,
        ProviderId: Codec,
        RailId: Codec,
        BlockNumber: Codec,
        DataSetInfo: Codec,
        ProvingState: Codec,
    {
        fn get_data_set(data_set_id: &DataSetId) -> Result<DataSetInfo, GetDataSetError>;
        fn get_data_set_status(data_set_id: &DataSetId) -> Result<DataSetStatus, GetDataSetError>;
        fn get_data_set_metadata(data_set_id: &DataSetId, key: Vec<u8>) -> MetadataEntry;
        fn get_all_data_set_metadata(data_set_id: &DataSetId) -> MetadataEntries;
        fn get_piece_metadata(data_set_id: &DataSetId, piece_id: &PieceId, key: Vec<u8>) -> MetadataEntry;
        fn get_all_piece_metadata(data_set_id: &DataSetId, piece_id: &PieceId) -> MetadataEntries;
        fn get_client_data_sets(payer: &AccountId) -> Vec<(DataSetId, DataSetInfo)>;
        fn get_approved_providers(offset: u32, limit: u32) -> Vec<ProviderId>;
        fn is_provider_approved(provider_id: &ProviderId) -> bool;
        fn get_pdp_config() -> Result<PdpConfigView<BlockNumber>, GetPdpConfigError>;
        fn get_proving_state(data_set_id: &DataSetId) -> Option<ProvingState>;
        fn is_epoch_proven(data_set_id: &DataSetId, epoch: BlockNumber) -> bool;
        fn get_rail_data_set(rail_id: &RailId) -> Option<DataSetId>;
        fn get_view_contract() -> Option<AccountId>;
    }
}

/// Error type for the `get_data_set` and `get_data_set_status` runtime API calls.
#[derive(Eq, PartialEq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub enum GetDataSetError {
    DataSetNotFound,
}

/// Error type for the `get_pdp_config` runtime API call.
#[derive(Eq, PartialEq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub enum GetPdpConfigError {
    ProvingPeriodNotConfigured,
}
