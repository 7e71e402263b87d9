#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode, FullCodec, MaxEncodedLen};
use frame_support::{
    dispatch::DispatchResult,
    pallet_prelude::{MaybeSerializeDeserialize, Member},
    Parameter,
};
use scale_info::{prelude::fmt::Debug, TypeInfo};
use sp_runtime::{traits::AtLeast32BitUnsigned, DispatchError, RuntimeDebug};

/// Information the service-provider registry keeps about a registered Provider.
#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct ProviderInfo<AccountId> {
    /// Account that operates the Provider and submits proofs on its behalf.
    pub service_provider: AccountId,
    /// Account that receives the payments owed to the Provider.
    pub payee: AccountId,
    /// Whether the Provider is currently active in the registry.
    pub is_active: bool,
}

/// A trait to read information about Providers registered in the service-provider registry.
///
/// The registry owns the capability offerings of each Provider; services built on top of it only
/// need to resolve accounts to Provider IDs and back.
pub trait ServiceProviderRegistryInterface {
    /// Type that can be used to identify accounts.
    type AccountId: Parameter + Member + MaybeSerializeDeserialize + Debug + Ord + MaxEncodedLen;

    /// Type of the registered Providers' IDs. Zero is never a valid ID.
    type ProviderId: Parameter
        + Member
        + MaybeSerializeDeserialize
        + Debug
        + Ord
        + Copy
        + AtLeast32BitUnsigned
        + MaxEncodedLen
        + FullCodec;

    /// Get the information of a registered Provider.
    fn get_provider(provider_id: &Self::ProviderId) -> Option<ProviderInfo<Self::AccountId>>;

    /// Check if an account is the service provider of a registered, active Provider.
    fn is_registered_provider(who: &Self::AccountId) -> bool;

    /// Get the Provider ID of a service provider account, if registered.
    fn get_provider_id_by_address(who: &Self::AccountId) -> Option<Self::ProviderId>;
}

/// A view of a payment rail as stored by the payments ledger.
#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct RailView<AccountId, Balance, BlockNumber> {
    /// Account the rail pulls funds from.
    pub payer: AccountId,
    /// Account the rail pays to.
    pub payee: AccountId,
    /// Account allowed to modify the rail's rate and lockup.
    pub operator: AccountId,
    /// Account that arbitrates settlements of the rail, if any.
    pub validator: Option<AccountId>,
    /// Part of every payment, in basis points, that goes to the operator.
    pub commission_rate_bps: u16,
    /// Amount paid per epoch.
    pub payment_rate: Balance,
    /// Number of epochs of `payment_rate` that are kept locked from the payer's funds.
    pub lockup_period: BlockNumber,
    /// Fixed amount locked on top of the rate-based lockup.
    pub lockup_fixed: Balance,
    /// Last epoch the rail pays for, once it has been terminated.
    pub end_epoch: Option<BlockNumber>,
}

/// The interface of the payments ledger that manages payment rails.
///
/// A rail is a payment flow from a payer to a payee that an operator (the service creating it)
/// can re-rate, lock funds for and terminate. The ledger is in charge of balances, operator
/// approvals and settlement; the service only issues rail mutations.
pub trait PaymentRailsInterface {
    /// The type which represents an account identifier.
    type AccountId: Parameter + Member + MaybeSerializeDeserialize + Debug + Ord + MaxEncodedLen;
    /// The type which represents a balance.
    type Balance: Parameter
        + Member
        + MaybeSerializeDeserialize
        + Debug
        + Copy
        + Default
        + AtLeast32BitUnsigned
        + MaxEncodedLen;
    /// The type which represents a block number (epoch).
    type BlockNumber: Parameter
        + Member
        + MaybeSerializeDeserialize
        + Debug
        + Copy
        + Ord
        + MaxEncodedLen;
    /// The type which represents a rail identifier. Zero is never a valid ID.
    type RailId: Parameter
        + Member
        + MaybeSerializeDeserialize
        + Debug
        + Ord
        + Copy
        + AtLeast32BitUnsigned
        + MaxEncodedLen
        + FullCodec;

    /// Create a new zero-rate rail operated by `operator`.
    ///
    /// Fails if `payer` has not approved `operator` in the ledger.
    fn create_rail(
        payer: &Self::AccountId,
        payee: &Self::AccountId,
        operator: &Self::AccountId,
        validator: Option<&Self::AccountId>,
        commission_rate_bps: u16,
    ) -> Result<Self::RailId, DispatchError>;

    /// Set the lockup parameters of a rail.
    fn modify_rail_lockup(
        rail_id: &Self::RailId,
        lockup_period: Self::BlockNumber,
        lockup_fixed: Self::Balance,
    ) -> DispatchResult;

    /// Set the per-epoch rate of a rail, optionally paying `one_time_payment` out of its fixed
    /// lockup right away.
    fn modify_rail_payment(
        rail_id: &Self::RailId,
        new_rate: Self::Balance,
        one_time_payment: Self::Balance,
    ) -> DispatchResult;

    /// Terminate a rail, returning the last epoch it will pay for.
    fn terminate_rail(rail_id: &Self::RailId) -> Result<Self::BlockNumber, DispatchError>;

    /// Get the current state of a rail.
    fn get_rail(
        rail_id: &Self::RailId,
    ) -> Option<RailView<Self::AccountId, Self::Balance, Self::BlockNumber>>;
}

/// Result of arbitrating a settlement of a rail.
#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct PaymentValidation<Balance, BlockNumber> {
    /// Amount the payee should actually receive for the settled range.
    pub modified_amount: Balance,
    /// Last epoch the settlement is allowed to cover.
    pub settle_upto: BlockNumber,
}

/// Implemented by services that act as the validator of the rails they create, so the payments
/// ledger can ask them how much of a proposed settlement is actually owed.
pub trait RailValidator {
    /// The type which represents a rail identifier.
    type RailId;
    /// The type which represents a balance.
    type Balance;
    /// The type which represents a block number (epoch).
    type BlockNumber;

    /// Validate a settlement of `proposed_amount` for the epochs in `(from_epoch, to_epoch]`.
    fn validate_payment(
        rail_id: &Self::RailId,
        proposed_amount: Self::Balance,
        from_epoch: Self::BlockNumber,
        to_epoch: Self::BlockNumber,
    ) -> Result<PaymentValidation<Self::Balance, Self::BlockNumber>, DispatchError>;
}

/// Resolves the size in bytes of a piece from its content identifier.
///
/// Piece CIDs are opaque to the warm storage service; size extraction belongs to the proof
/// verification engine, which can plug its own resolver here.
pub trait PieceSizeResolver {
    /// Get the size of the piece identified by `piece_cid`, if it can be derived.
    fn piece_size(piece_cid: &[u8]) -> Option<u64>;
}

impl PieceSizeResolver for () {
    fn piece_size(_piece_cid: &[u8]) -> Option<u64> {
        None
    }
}
