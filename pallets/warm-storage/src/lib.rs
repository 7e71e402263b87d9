//! # Warm Storage Pallet
//!
//! This pallet implements the warm storage service that sits between a proof-of-data-possession
//! (PDP) verifier, a service-provider registry and a payments ledger. It tracks the lifecycle of
//! data sets and their pieces, validates proving periods and schedules challenges, stores bounded
//! metadata and orchestrates the payment rails that pay Providers for proven storage.
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

pub mod migrations;
pub mod types;

mod approvals;
mod metadata;
mod rails;
mod signature;
mod utils;

#[cfg(feature = "runtime-benchmarks")]
pub mod benchmarking;

#[cfg(test)]
mod mock;


pub use pallet::*;
pub use pallet_warm_storage_runtime_api::{DataSetStatus, PdpConfigView};

pub(crate) const LOG_TARGET: &str = "runtime::warm-storage";

#[frame_support::pallet]
pub mod pallet {
    use super::types::*;
    use frame_support::{
        dispatch::DispatchResultWithPostInfo, pallet_prelude::*, traits::EnsureOrigin, PalletId,
    };
    use frame_system::pallet_prelude::*;
    use scale_info::prelude::vec::Vec;
    use sp_core::{H160, H256};
    use sp_runtime::traits::{Convert, Zero};
    use wsp_constants::COMMISSION_MAX_BPS;
    use wsp_traits::{PaymentRailsInterface, PieceSizeResolver, ServiceProviderRegistryInterface};

    /// The in-code storage version.
    const STORAGE_VERSION: StorageVersion = StorageVersion::new(1);

    /// Configure the pallet by specifying the parameters and types on which it depends.
    #[pallet::config]
    pub trait Config: frame_system::Config {
        /// Because this pallet emits events, it depends on the runtime's definition of an event.
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        /// The service-provider registry, used to resolve service provider accounts to Provider IDs.
        type Registry: ServiceProviderRegistryInterface<AccountId = Self::AccountId>;

        /// The payments ledger in which this service creates and operates rails.
        type PaymentRails: PaymentRailsInterface<
            AccountId = Self::AccountId,
            BlockNumber = BlockNumberFor<Self>,
        >;

        /// Resolves the size of added pieces from their CIDs, to keep the storage rates up to date.
        type PieceSizes: PieceSizeResolver;

        /// Maps the 20-byte address recovered from a signature to the account that signed it.
        type SignerToAccountId: Convert<H160, Self::AccountId>;

        /// The origin allowed to manage the approved Providers and the service configuration.
        type ServiceOwnerOrigin: EnsureOrigin<Self::RuntimeOrigin>;

        /// The account of the PDP verifier. Only this account can dispatch the lifecycle callbacks.
        #[pallet::constant]
        type PdpVerifierAccount: Get<Self::AccountId>;

        /// The ID of this service. Its derived account is the operator and validator of the rails.
        #[pallet::constant]
        type PalletId: Get<PalletId>;

        /// The account that receives the payments of CDN rails.
        #[pallet::constant]
        type CdnBeneficiary: Get<Self::AccountId>;

        /// Maximum byte length of a metadata key.
        #[pallet::constant]
        type MaxMetadataKeyLength: Get<u32>;

        /// Maximum byte length of a metadata value.
        #[pallet::constant]
        type MaxMetadataValueLength: Get<u32>;

        /// Maximum number of metadata keys of a data set.
        #[pallet::constant]
        type MaxDataSetMetadataKeys: Get<u32>;

        /// Maximum number of metadata keys of a piece.
        #[pallet::constant]
        type MaxPieceMetadataKeys: Get<u32>;

        /// Maximum number of Providers that can be approved at the same time.
        #[pallet::constant]
        type MaxApprovedProviders: Get<u32>;

        /// Maximum byte length of a piece CID.
        #[pallet::constant]
        type MaxPieceCidLength: Get<u32>;

        /// Minimum number of challenges a possession proof has to answer.
        #[pallet::constant]
        type ChallengesPerProof: Get<u32>;

        /// One-time fee charged to the payer when a data set is created.
        #[pallet::constant]
        type DataSetCreationFee: Get<BalanceOf<Self>>;

        /// Price of storing a TiB for a month, paid through the PDP rail.
        #[pallet::constant]
        type StoragePricePerTibPerMonth: Get<BalanceOf<Self>>;

        /// Price per TiB per month of the cache-miss rail.
        #[pallet::constant]
        type CacheMissPricePerTibPerMonth: Get<BalanceOf<Self>>;

        /// Price per TiB per month of the CDN rail.
        #[pallet::constant]
        type CdnPricePerTibPerMonth: Get<BalanceOf<Self>>;

        /// Commission, in basis points, this service takes from the PDP rail.
        #[pallet::constant]
        type ServiceCommissionBps: Get<u16>;

        /// Number of epochs of payment that stay locked for every rail.
        #[pallet::constant]
        type DefaultLockupPeriod: Get<BlockNumberFor<Self>>;

        /// Number of epochs in a month, used to turn monthly prices into per-epoch rates.
        #[pallet::constant]
        type EpochsPerMonth: Get<u32>;

        /// Sets up the registry, the payments ledger and the payer keys for benchmarks.
        #[cfg(feature = "runtime-benchmarks")]
        type BenchmarkHelpers: crate::benchmarking::BenchmarkHelpers<Self>;
    }

    #[pallet::pallet]
    #[pallet::storage_version(STORAGE_VERSION)]
    pub struct Pallet<T>(_);

    // Storage:

    /// The mapping from a data set ID to its information.
    ///
    /// This storage is updated in:
    /// - [data_set_created](Pallet::data_set_created), which adds a new entry to the map.
    /// - [storage_provider_changed](Pallet::storage_provider_changed), which updates the entry's `service_provider`.
    /// - [terminate_service](Pallet::terminate_service), which sets the entry's `payment_end_epoch`.
    #[pallet::storage]
    pub type DataSets<T: Config> = StorageMap<_, Blake2_128Concat, DataSetId, DataSetInfo<T>>;

    /// The double mapping from a payer and its client data set ID to the data set ID.
    ///
    /// Entries are never removed, so a client data set ID can only be used once per payer.
    #[pallet::storage]
    pub type ClientDataSets<T: Config> = StorageDoubleMap<
        _,
        Blake2_128Concat,
        T::AccountId,
        Blake2_128Concat,
        ClientDataSetId,
        DataSetId,
    >;

    /// The mapping from every rail created by this service to the data set it pays for.
    #[pallet::storage]
    pub type RailToDataSet<T: Config> =
        StorageMap<_, Blake2_128Concat, RailIdFor<T>, DataSetId>;

    /// The number of pieces added so far to each data set, which is also the ID of the next piece.
    #[pallet::storage]
    pub type NextPieceIds<T: Config> = StorageMap<_, Blake2_128Concat, DataSetId, PieceId, ValueQuery>;

    /// The number of bytes each data set is being charged for.
    #[pallet::storage]
    pub type StoredBytes<T: Config> = StorageMap<_, Blake2_128Concat, DataSetId, u64, ValueQuery>;

    /// The proving state of each data set that has started proving.
    ///
    /// This storage is updated in:
    /// - [next_proving_period](Pallet::next_proving_period), which creates the entry and moves its deadline.
    /// - [possession_proven](Pallet::possession_proven), which flags the current period as proven.
    #[pallet::storage]
    pub type ProvingStates<T: Config> =
        StorageMap<_, Blake2_128Concat, DataSetId, ProvingStateFor<T>>;

    /// The set of proving periods, per data set, for which a valid proof was submitted.
    #[pallet::storage]
    pub type ProvenPeriods<T: Config> =
        StorageDoubleMap<_, Blake2_128Concat, DataSetId, Blake2_128Concat, PeriodIndex, ()>;

    /// The metadata entries of each data set.
    #[pallet::storage]
    pub type DataSetMetadata<T: Config> = StorageDoubleMap<
        _,
        Blake2_128Concat,
        DataSetId,
        Blake2_128Concat,
        MetadataKey<T>,
        MetadataValue<T>,
    >;

    /// The metadata keys of each data set, in insertion order.
    #[pallet::storage]
    pub type DataSetMetadataKeys<T: Config> =
        StorageMap<_, Blake2_128Concat, DataSetId, DataSetMetadataKeysFor<T>, ValueQuery>;

    /// The metadata entries of each piece.
    #[pallet::storage]
    pub type PieceMetadata<T: Config> = StorageNMap<
        _,
        (
            NMapKey<Blake2_128Concat, DataSetId>,
            NMapKey<Blake2_128Concat, PieceId>,
            NMapKey<Blake2_128Concat, MetadataKey<T>>,
        ),
        MetadataValue<T>,
    >;

    /// The metadata keys of each piece, in insertion order.
    #[pallet::storage]
    pub type PieceMetadataKeys<T: Config> = StorageDoubleMap<
        _,
        Blake2_128Concat,
        DataSetId,
        Blake2_128Concat,
        PieceId,
        PieceMetadataKeysFor<T>,
        ValueQuery,
    >;

    /// The list of Providers approved to create data sets.
    #[pallet::storage]
    pub type ApprovedProviders<T: Config> = StorageValue<_, ApprovedProvidersFor<T>, ValueQuery>;

    /// The position of each approved Provider in [`ApprovedProviders`].
    #[pallet::storage]
    pub type ApprovedProviderIndex<T: Config> =
        StorageMap<_, Blake2_128Concat, ProviderIdFor<T>, u32>;

    /// The proving period configuration of the service.
    #[pallet::storage]
    pub type PdpConfiguration<T: Config> = StorageValue<_, PdpConfigFor<T>>;

    /// The account of the read-only view companion. Can only be set once.
    #[pallet::storage]
    pub type ViewContract<T: Config> = StorageValue<_, T::AccountId>;

    // Genesis config:
    #[pallet::genesis_config]
    pub struct GenesisConfig<T: Config> {
        /// Length of a proving period. Zero leaves proving unconfigured.
        pub max_proving_period: BlockNumberFor<T>,
        /// Length of the challenge window closing each proving period.
        pub challenge_window_size: BlockNumberFor<T>,
        /// Providers approved from genesis.
        pub approved_providers: Vec<ProviderIdFor<T>>,
    }

    impl<T: Config> Default for GenesisConfig<T> {
        fn default() -> Self {
            Self {
                max_proving_period: Zero::zero(),
                challenge_window_size: Zero::zero(),
                approved_providers: Vec::new(),
            }
        }
    }

    #[pallet::genesis_build]
    impl<T: Config> BuildGenesisConfig for GenesisConfig<T> {
        fn build(&self) {
            if !self.max_proving_period.is_zero() {
                assert!(
                    !self.challenge_window_size.is_zero()
                        && self.challenge_window_size < self.max_proving_period,
                    "Challenge window must be non-zero and shorter than the proving period"
                );
                PdpConfiguration::<T>::put(PdpConfig {
                    max_proving_period: self.max_proving_period,
                    challenge_window_size: self.challenge_window_size,
                });
            }

            for provider_id in self.approved_providers.iter() {
                assert!(!provider_id.is_zero(), "Provider ID zero cannot be approved");
                assert!(
                    !ApprovedProviderIndex::<T>::contains_key(provider_id),
                    "Provider approved twice in genesis"
                );
                ApprovedProviders::<T>::mutate(|approved| {
                    let index = approved.len() as u32;
                    assert!(
                        approved.try_push(*provider_id).is_ok(),
                        "Too many approved Providers in genesis"
                    );
                    ApprovedProviderIndex::<T>::insert(provider_id, index);
                });
            }
        }
    }

    // Events & Errors:

    /// The events that can be emitted by this pallet
    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// A data set was created, with its rails and metadata.
        DataSetCreated {
            data_set_id: DataSetId,
            provider_id: ProviderIdFor<T>,
            service_provider: T::AccountId,
            payer: T::AccountId,
            payee: T::AccountId,
            pdp_rail_id: RailIdFor<T>,
            cache_miss_rail_id: Option<RailIdFor<T>>,
            cdn_rail_id: Option<RailIdFor<T>>,
            metadata_keys: Vec<Vec<u8>>,
            metadata_values: Vec<Vec<u8>>,
        },
        /// A piece was added to a data set. Emitted once per piece.
        PieceAdded {
            data_set_id: DataSetId,
            piece_id: PieceId,
            piece_cid: PieceCid<T>,
            metadata_keys: Vec<Vec<u8>>,
            metadata_values: Vec<Vec<u8>>,
        },
        /// The payer authorized the removal of pieces from a data set.
        PieceRemovalsScheduled {
            data_set_id: DataSetId,
            piece_ids: Vec<PieceId>,
        },
        /// A possession proof was accepted for a proving period.
        PossessionProven {
            data_set_id: DataSetId,
            period: PeriodIndex,
            challenge_count: u64,
        },
        /// The next challenge of a data set was scheduled. A `None` deadline means the data set
        /// is parked until a new challenge is scheduled.
        NextProvingPeriod {
            data_set_id: DataSetId,
            challenge_epoch: BlockNumberFor<T>,
            leaf_count: u64,
            deadline: Option<BlockNumberFor<T>>,
        },
        /// Proving periods of a data set closed without a proof.
        FaultRecord {
            data_set_id: DataSetId,
            periods_faulted: u64,
            deadline: BlockNumberFor<T>,
        },
        /// The per-epoch rate of one of the rails of a data set changed.
        RailRateUpdated {
            data_set_id: DataSetId,
            rail_id: RailIdFor<T>,
            new_rate: BalanceOf<T>,
        },
        /// A data set was reassigned to a new service provider.
        DataSetServiceProviderChanged {
            data_set_id: DataSetId,
            old_service_provider: T::AccountId,
            new_service_provider: T::AccountId,
        },
        /// The service of a data set was terminated. Its rails pay until `payment_end_epoch`.
        ServiceTerminated {
            caller: T::AccountId,
            data_set_id: DataSetId,
            pdp_rail_id: RailIdFor<T>,
            cache_miss_rail_id: Option<RailIdFor<T>>,
            cdn_rail_id: Option<RailIdFor<T>>,
            payment_end_epoch: BlockNumberFor<T>,
        },
        /// A Provider was added to the approved list.
        ProviderApproved { provider_id: ProviderIdFor<T> },
        /// A Provider was removed from the approved list.
        ProviderUnapproved { provider_id: ProviderIdFor<T> },
        /// The proving period configuration was updated.
        ProvingPeriodConfigured {
            max_proving_period: BlockNumberFor<T>,
            challenge_window_size: BlockNumberFor<T>,
        },
        /// The view companion account was set.
        ViewContractSet { view_contract: T::AccountId },
    }

    /// The errors that can be thrown by this pallet to inform users about what went wrong
    #[pallet::error]
    pub enum Error<T> {
        /// Error thrown when a lifecycle callback is not dispatched by the PDP verifier.
        OnlyPdpVerifierAllowed,
        /// Error thrown when the extra data forwarded by the PDP verifier can't be decoded.
        InvalidExtraData,
        /// Error thrown when trying to create a data set whose ID is already in use.
        DataSetAlreadyExists,
        /// Error thrown when the data set does not exist.
        DataSetNotFound,
        /// Error thrown when the service provider or Provider ID is not known to the registry.
        ProviderNotRegistered,
        /// Error thrown when a Provider that is not approved tries to create a data set.
        ProviderNotApproved,
        /// Error thrown when trying to approve Provider ID zero.
        InvalidProviderId,
        /// Error thrown when trying to approve a Provider that is already approved.
        ProviderAlreadyApproved,
        /// Error thrown when trying to remove a Provider that is not approved.
        ProviderNotInApprovedList,
        /// Error thrown when the index hint does not match the position of the Provider in the approved list.
        ApprovedProviderIndexMismatch,
        /// Error thrown when the approved list is full.
        TooManyApprovedProviders,
        /// Error thrown when the payer already used the client data set ID.
        ClientDataSetAlreadyRegistered,
        /// Error thrown when a signature is not 65 bytes long.
        InvalidSignatureLength,
        /// Error thrown when the recovery byte of a signature is not 27 or 28 (after normalisation).
        UnsupportedSignatureV { v: u8 },
        /// Error thrown when a signature was not made by the payer.
        InvalidSignature,
        /// Error thrown when a scope would end up with more metadata keys than allowed.
        TooManyMetadataKeys { max_allowed: u8, keys_count: u8 },
        /// Error thrown when a metadata key is longer than allowed.
        MetadataKeyExceedsMaxLength { max_allowed: u8, length: u8 },
        /// Error thrown when a metadata value is longer than allowed.
        MetadataValueExceedsMaxLength { max_allowed: u8, length: u8 },
        /// Error thrown when the number of metadata keys and values differ.
        MetadataKeyAndValueLengthMismatch { keys_count: u8, values_count: u8 },
        /// Error thrown when the number of per-piece metadata lists differs from the number of pieces.
        MetadataArrayCountMismatch { metadata_count: u8, piece_count: u8 },
        /// Error thrown when a metadata key is already set or repeated in the same batch.
        DuplicateMetadataKey,
        /// Error thrown when the first added piece ID is not the next piece ID of the data set.
        InvalidFirstAddedPiece,
        /// Error thrown when termination was already requested for the data set.
        DataSetPaymentAlreadyTerminated,
        /// Error thrown when operating on a data set whose payment end epoch has elapsed.
        DataSetPaymentBeyondEndEpoch,
        /// Error thrown when the caller of `terminate_service` is neither the payer nor the service provider.
        CallerNotPayerOrPayee,
        /// Error thrown when the old service provider does not match the recorded one.
        OldServiceProviderMismatch,
        /// Error thrown when the new service provider is the zero account.
        InvalidServiceProvider,
        /// Error thrown when the proving period was never configured.
        ProvingPeriodNotConfigured,
        /// Error thrown when submitting a proof for a data set with no scheduled challenge.
        ProvingNotStarted,
        /// Error thrown when a proof was already accepted for the current proving period.
        ProofAlreadySubmitted,
        /// Error thrown when a proof answers fewer challenges than required.
        InvalidChallengeCount,
        /// Error thrown when a proof is submitted before the challenge window opens.
        ChallengeWindowNotOpen,
        /// Error thrown when a proof is submitted after the proving deadline.
        ProvingPeriodPassed,
        /// Error thrown when the scheduled challenge epoch is outside the next challenge window.
        InvalidChallengeEpoch,
        /// Error thrown when configuring a zero proving period.
        InvalidMaxProvingPeriod,
        /// Error thrown when the challenge window is zero or not shorter than the proving period.
        InvalidChallengeWindowSize,
        /// Error thrown when the payments ledger does not know a rail of a data set.
        InvalidRailId,
        /// Error thrown when validating a payment of a rail not created by this service.
        RailNotAssociated,
        /// Error thrown when the settlement range ends before it starts.
        InvalidEpochRange,
        /// Error thrown when trying to set the view companion a second time.
        ViewContractAlreadySet,
        /// Error thrown when the view companion account is the zero account.
        InvalidViewContractAddress,
    }

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
        fn integrity_test() {
            assert!(
                T::ServiceCommissionBps::get() <= COMMISSION_MAX_BPS,
                "ServiceCommissionBps must not exceed 100%"
            );
            assert!(
                T::EpochsPerMonth::get() > 0,
                "Monthly prices cannot be turned into rates without EpochsPerMonth"
            );
            assert!(
                T::MaxMetadataKeyLength::get() <= u8::MAX as u32
                    && T::MaxMetadataValueLength::get() <= u8::MAX as u32,
                "Metadata bounds must fit the u8 context of metadata errors"
            );
        }
    }

    /// Dispatchables (extrinsics) exposed by this pallet
    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Callback of the PDP verifier for a newly created data set.
        ///
        /// The dispatch origin for this call must be signed by the PDP verifier account.
        ///
        /// Parameters:
        /// - `data_set_id`: The ID the verifier assigned to the data set.
        /// - `service_provider`: The account of the Provider storing the data set.
        /// - `extra_data`: SCALE-encoded [`DataSetCreatePayload`], signed by the payer.
        ///
        /// This extrinsic will perform the following checks and logic:
        /// 1. Check that the data set does not exist yet
        /// 2. Check that the service provider is registered and its Provider ID approved
        /// 3. Check that the payer has not used the client data set ID before
        /// 4. Verify the payer's signature and store the data set's metadata
        /// 5. Create the PDP rail, charging the creation fee, and the CDN rails if `withCDN` is set
        ///
        /// Emits `DataSetCreated` event when successful.
        #[pallet::call_index(0)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().reads_writes(8, 8))]
        pub fn data_set_created(
            origin: OriginFor<T>,
            data_set_id: DataSetId,
            service_provider: T::AccountId,
            extra_data: Vec<u8>,
        ) -> DispatchResultWithPostInfo {
            Self::ensure_pdp_verifier(origin)?;

            Self::do_data_set_created(data_set_id, service_provider, &extra_data)?;

            Ok(().into())
        }

        /// Callback of the PDP verifier for pieces added to a data set.
        ///
        /// `extra_data` is a SCALE-encoded [`PiecesAddedPayload`], with one metadata list per piece.
        ///
        /// Emits a `PieceAdded` event per piece and a `RailRateUpdated` event per re-rated rail.
        #[pallet::call_index(1)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().reads_writes(6, 6))]
        pub fn pieces_added(
            origin: OriginFor<T>,
            data_set_id: DataSetId,
            first_added: PieceId,
            piece_cids: Vec<PieceCid<T>>,
            extra_data: Vec<u8>,
        ) -> DispatchResultWithPostInfo {
            Self::ensure_pdp_verifier(origin)?;

            Self::do_pieces_added(data_set_id, first_added, piece_cids, &extra_data)?;

            Ok(().into())
        }

        /// Callback of the PDP verifier for pieces scheduled for removal. The payer must have
        /// signed the removal. Piece metadata is kept.
        ///
        /// Emits `PieceRemovalsScheduled` event when successful.
        #[pallet::call_index(2)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().reads(2))]
        pub fn pieces_scheduled_remove(
            origin: OriginFor<T>,
            data_set_id: DataSetId,
            piece_ids: Vec<PieceId>,
            extra_data: Vec<u8>,
        ) -> DispatchResultWithPostInfo {
            Self::ensure_pdp_verifier(origin)?;

            Self::do_pieces_scheduled_remove(data_set_id, &piece_ids, &extra_data)?;

            Self::deposit_event(Event::<T>::PieceRemovalsScheduled {
                data_set_id,
                piece_ids,
            });

            Ok(().into())
        }

        /// Callback of the PDP verifier for an accepted possession proof.
        ///
        /// The proof must land inside the challenge window of the current proving period and
        /// answer at least `ChallengesPerProof` challenges.
        ///
        /// Emits `PossessionProven` event when successful.
        #[pallet::call_index(3)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().reads_writes(4, 2))]
        pub fn possession_proven(
            origin: OriginFor<T>,
            data_set_id: DataSetId,
            leaf_count: u64,
            seed: H256,
            challenge_count: u64,
        ) -> DispatchResultWithPostInfo {
            Self::ensure_pdp_verifier(origin)?;

            let period =
                Self::do_possession_proven(data_set_id, leaf_count, seed, challenge_count)?;

            Self::deposit_event(Event::<T>::PossessionProven {
                data_set_id,
                period,
                challenge_count,
            });

            Ok(().into())
        }

        /// Callback of the PDP verifier scheduling the next challenge of a data set.
        ///
        /// The first call starts proving. Later calls close the current proving period, record
        /// faults for unproven or skipped periods and move the deadline forward. A zero
        /// `challenge_epoch` parks the data set.
        ///
        /// Emits `NextProvingPeriod`, and `FaultRecord` when periods were missed.
        #[pallet::call_index(4)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().reads_writes(6, 4))]
        pub fn next_proving_period(
            origin: OriginFor<T>,
            data_set_id: DataSetId,
            challenge_epoch: BlockNumberFor<T>,
            leaf_count: u64,
            _extra_data: Vec<u8>,
        ) -> DispatchResultWithPostInfo {
            Self::ensure_pdp_verifier(origin)?;

            let deadline = Self::do_next_proving_period(data_set_id, challenge_epoch, leaf_count)?;

            Self::deposit_event(Event::<T>::NextProvingPeriod {
                data_set_id,
                challenge_epoch,
                leaf_count,
                deadline,
            });

            Ok(().into())
        }

        /// Callback of the PDP verifier for a data set reassigned to another service provider.
        ///
        /// Only the service provider of record changes. The payee, payer, rails and metadata
        /// are kept.
        ///
        /// Emits `DataSetServiceProviderChanged` event when successful.
        #[pallet::call_index(5)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().reads_writes(1, 1))]
        pub fn storage_provider_changed(
            origin: OriginFor<T>,
            data_set_id: DataSetId,
            old_service_provider: T::AccountId,
            new_service_provider: T::AccountId,
            _extra_data: Vec<u8>,
        ) -> DispatchResultWithPostInfo {
            Self::ensure_pdp_verifier(origin)?;

            Self::do_storage_provider_changed(
                data_set_id,
                &old_service_provider,
                &new_service_provider,
            )?;

            Self::deposit_event(Event::<T>::DataSetServiceProviderChanged {
                data_set_id,
                old_service_provider,
                new_service_provider,
            });

            Ok(().into())
        }

        /// Terminate the service of a data set.
        ///
        /// The dispatch origin for this call must be signed by the payer or the service provider
        /// of the data set. All its rails are terminated and the data set stops accepting
        /// lifecycle callbacks once the PDP rail's end epoch has passed.
        ///
        /// Emits `ServiceTerminated` event when successful.
        #[pallet::call_index(6)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().reads_writes(4, 1))]
        pub fn terminate_service(
            origin: OriginFor<T>,
            data_set_id: DataSetId,
        ) -> DispatchResultWithPostInfo {
            // Check that the extrinsic was signed and get the signer
            let caller = ensure_signed(origin)?;

            let (info, payment_end_epoch) = Self::do_terminate_service(&caller, data_set_id)?;

            let cdn_rails = info.cdn_rails;
            Self::deposit_event(Event::<T>::ServiceTerminated {
                caller,
                data_set_id,
                pdp_rail_id: info.pdp_rail_id,
                cache_miss_rail_id: cdn_rails.map(|rails| rails.cache_miss_rail_id),
                cdn_rail_id: cdn_rails.map(|rails| rails.cdn_rail_id),
                payment_end_epoch,
            });

            Ok(().into())
        }

        /// Add a Provider to the list of Providers approved to create data sets.
        ///
        /// The dispatch origin for this call must be `ServiceOwnerOrigin`.
        #[pallet::call_index(7)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().reads_writes(3, 2))]
        pub fn add_approved_provider(
            origin: OriginFor<T>,
            provider_id: ProviderIdFor<T>,
        ) -> DispatchResultWithPostInfo {
            T::ServiceOwnerOrigin::ensure_origin(origin)?;

            Self::do_add_approved_provider(provider_id)?;

            Self::deposit_event(Event::<T>::ProviderApproved { provider_id });

            Ok(().into())
        }

        /// Remove a Provider from the approved list. `index_hint` must be its current position.
        ///
        /// The dispatch origin for this call must be `ServiceOwnerOrigin`. Existing data sets of
        /// the Provider are not affected.
        #[pallet::call_index(8)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().reads_writes(2, 3))]
        pub fn remove_approved_provider(
            origin: OriginFor<T>,
            provider_id: ProviderIdFor<T>,
            index_hint: u32,
        ) -> DispatchResultWithPostInfo {
            T::ServiceOwnerOrigin::ensure_origin(origin)?;

            Self::do_remove_approved_provider(provider_id, index_hint)?;

            Self::deposit_event(Event::<T>::ProviderUnapproved { provider_id });

            Ok(().into())
        }

        /// Set the proving period length and the challenge window size.
        ///
        /// The dispatch origin for this call must be `ServiceOwnerOrigin`. The window must be
        /// non-zero and strictly shorter than the proving period.
        #[pallet::call_index(9)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn configure_proving_period(
            origin: OriginFor<T>,
            max_proving_period: BlockNumberFor<T>,
            challenge_window_size: BlockNumberFor<T>,
        ) -> DispatchResultWithPostInfo {
            T::ServiceOwnerOrigin::ensure_origin(origin)?;

            ensure!(
                !max_proving_period.is_zero(),
                Error::<T>::InvalidMaxProvingPeriod
            );
            ensure!(
                !challenge_window_size.is_zero() && challenge_window_size < max_proving_period,
                Error::<T>::InvalidChallengeWindowSize
            );

            PdpConfiguration::<T>::put(PdpConfig {
                max_proving_period,
                challenge_window_size,
            });

            Self::deposit_event(Event::<T>::ProvingPeriodConfigured {
                max_proving_period,
                challenge_window_size,
            });

            Ok(().into())
        }

        /// Set the account of the read-only view companion. Can only be done once.
        ///
        /// The dispatch origin for this call must be `ServiceOwnerOrigin`.
        #[pallet::call_index(10)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().reads_writes(1, 1))]
        pub fn set_view_contract(
            origin: OriginFor<T>,
            view_contract: T::AccountId,
        ) -> DispatchResultWithPostInfo {
            T::ServiceOwnerOrigin::ensure_origin(origin)?;

            ensure!(
                !Self::is_zero_account(&view_contract),
                Error::<T>::InvalidViewContractAddress
            );
            ensure!(
                !ViewContract::<T>::exists(),
                Error::<T>::ViewContractAlreadySet
            );

            ViewContract::<T>::put(&view_contract);

            Self::deposit_event(Event::<T>::ViewContractSet { view_contract });

            Ok(().into())
        }
    }
}

use frame_support::traits::Get;
use frame_system::pallet_prelude::BlockNumberFor;
use pallet_warm_storage_runtime_api::{GetDataSetError, GetPdpConfigError};
use scale_info::prelude::vec::Vec;
use sp_runtime::traits::Saturating;
use types::{DataSetId, DataSetInfo, ProvingStateFor, RailIdFor};

/// Helper functions (getters, etc.) for this pallet, used by the runtime API
impl<T: Config> Pallet<T> {
    /// A helper function to get the information of a data set
    pub fn get_data_set(data_set_id: &DataSetId) -> Result<DataSetInfo<T>, GetDataSetError> {
        DataSets::<T>::get(data_set_id).ok_or(GetDataSetError::DataSetNotFound)
    }

    /// A helper function to get the lifecycle status of a data set at the current block
    pub fn get_data_set_status(data_set_id: &DataSetId) -> Result<DataSetStatus, GetDataSetError> {
        let info = Self::get_data_set(data_set_id)?;
        Ok(match info.payment_end_epoch {
            None => DataSetStatus::Active,
            Some(end_epoch) if frame_system::Pallet::<T>::block_number() <= end_epoch => {
                DataSetStatus::Terminating
            }
            Some(_) => DataSetStatus::Terminated,
        })
    }

    /// A helper function that gets all data sets a payer created, keyed by data set ID
    pub fn get_client_data_sets(payer: &T::AccountId) -> Vec<(DataSetId, DataSetInfo<T>)> {
        ClientDataSets::<T>::iter_prefix_values(payer)
            .filter_map(|data_set_id| {
                DataSets::<T>::get(data_set_id).map(|info| (data_set_id, info))
            })
            .collect()
    }

    /// A helper function to get the proving configuration, including the start of the first
    /// challenge window of a data set that would start proving at the current block
    pub fn get_pdp_config() -> Result<PdpConfigView<BlockNumberFor<T>>, GetPdpConfigError> {
        let config =
            PdpConfiguration::<T>::get().ok_or(GetPdpConfigError::ProvingPeriodNotConfigured)?;
        let now = frame_system::Pallet::<T>::block_number();
        Ok(PdpConfigView {
            max_proving_period: config.max_proving_period,
            challenge_window_size: config.challenge_window_size,
            challenges_per_proof: T::ChallengesPerProof::get(),
            init_challenge_window_start: now
                .saturating_add(config.max_proving_period)
                .saturating_sub(config.challenge_window_size),
        })
    }

    /// A helper function to get the proving state of a data set, if it started proving
    pub fn get_proving_state(data_set_id: &DataSetId) -> Option<ProvingStateFor<T>> {
        ProvingStates::<T>::get(data_set_id)
    }

    /// A helper function to check whether the proving period containing `epoch` was proven
    pub fn is_epoch_proven(data_set_id: &DataSetId, epoch: BlockNumberFor<T>) -> bool {
        let (Some(state), Some(config)) = (
            ProvingStates::<T>::get(data_set_id),
            PdpConfiguration::<T>::get(),
        ) else {
            return false;
        };
        if epoch <= state.activation_epoch {
            return false;
        }
        ProvenPeriods::<T>::contains_key(data_set_id, Self::period_of(&state, epoch, &config))
    }

    /// A helper function to get the data set a rail pays for
    pub fn get_rail_data_set(rail_id: &RailIdFor<T>) -> Option<DataSetId> {
        RailToDataSet::<T>::get(rail_id)
    }

    /// A helper function to get the account of the view companion, if set
    pub fn get_view_contract() -> Option<T::AccountId> {
        ViewContract::<T>::get()
    }
}
