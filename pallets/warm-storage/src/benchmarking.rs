//! Benchmarking setup for pallet-warm-storage

#![cfg(feature = "runtime-benchmarks")]

use super::*;
use frame_benchmarking::v2::*;
use scale_info::prelude::vec::Vec;
use crate::types::ProviderIdFor;

/// State the benchmarks need from the registry, the payments ledger and the payers' keys, which
/// this pallet does not own.
pub trait BenchmarkHelpers<T: crate::Config> {
    /// Register an active Provider. Returns its ID, its service provider account and its payee.
    fn register_provider(index: u32) -> (ProviderIdFor<T>, T::AccountId, T::AccountId);

    /// Get a funded payer that approved `operator` in the payments ledger and whose
    /// authorizations can be signed with [`BenchmarkHelpers::sign`].
    fn setup_payer(index: u32, operator: &T::AccountId) -> T::AccountId;

    /// Sign `digest` on behalf of `payer`, as a 65-byte `r ‖ s ‖ v` signature.
    fn sign(payer: &T::AccountId, digest: &[u8; 32]) -> Vec<u8>;

    /// A piece CID that `T::PieceSizes` resolves to `size` bytes.
    fn piece_cid(index: u32, size: u64) -> Vec<u8>;
}

#[benchmarks]
mod benchmarks {
    use codec::Encode;
    use frame_support::traits::{EnsureOrigin, Get};
    use frame_system::{pallet_prelude::BlockNumberFor, RawOrigin};
    use sp_core::H256;
    use sp_runtime::traits::Saturating;
    use sp_std::{vec, vec::Vec};
    use wsp_constants::{BYTES_PER_LEAF, TIB_IN_BYTES, WITH_CDN_METADATA_KEY};

    use super::*;
    use crate::{pallet, types::*, Call, Config, Event, Pallet};

    const DATA_SET_ID: DataSetId = 1;
    const CLIENT_DATA_SET_ID: ClientDataSetId = 0;

    fn pdp_verifier<T: crate::Config>() -> RawOrigin<T::AccountId> {
        RawOrigin::Signed(T::PdpVerifierAccount::get())
    }

    fn owner_origin<T: crate::Config>() -> Result<T::RuntimeOrigin, BenchmarkError> {
        T::ServiceOwnerOrigin::try_successful_origin().map_err(|_| BenchmarkError::Weightless)
    }

    fn approve<T: crate::Config>(provider_id: ProviderIdFor<T>) -> Result<(), BenchmarkError> {
        if Pallet::<T>::is_provider_approved(&provider_id) {
            return Ok(());
        }
        Pallet::<T>::do_add_approved_provider(provider_id)
            .map_err(|_| BenchmarkError::Stop("Provider could not be approved."))
    }

    /// `count` metadata entries with keys and values of maximum length. The first key requests
    /// CDN service if `with_cdn` is set.
    fn max_metadata<T: crate::Config>(
        count: u32,
        with_cdn: bool,
    ) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        let key_length = T::MaxMetadataKeyLength::get() as usize;
        let value_length = T::MaxMetadataValueLength::get() as usize;

        let mut keys = Vec::new();
        let mut values = Vec::new();
        if with_cdn && count > 0 {
            keys.push(WITH_CDN_METADATA_KEY.to_vec());
            values.push(vec![1u8; value_length]);
        }
        let mut index: u8 = 0;
        while (keys.len() as u32) < count {
            keys.push(vec![b'a'.saturating_add(index); key_length]);
            values.push(vec![index; value_length]);
            index = index.saturating_add(1);
        }
        (keys, values)
    }

    fn pairs(keys: &[Vec<u8>], values: &[Vec<u8>]) -> MetadataPairs {
        keys.iter().cloned().zip(values.iter().cloned()).collect()
    }

    fn sign<T: crate::Config>(
        payer: &T::AccountId,
        operation: &AuthorizedOperation<T::AccountId>,
    ) -> Vec<u8> {
        T::BenchmarkHelpers::sign(payer, &Pallet::<T>::authorization_digest(operation))
    }

    fn ensure_pdp_config<T: crate::Config>() -> PdpConfigFor<T> {
        PdpConfiguration::<T>::get().unwrap_or_else(|| {
            let config = PdpConfig {
                max_proving_period: 100u32.into(),
                challenge_window_size: 20u32.into(),
            };
            PdpConfiguration::<T>::put(config);
            config
        })
    }

    /// Create a data set with every data set metadata key filled in. Returns the payer and the
    /// service provider.
    fn setup_data_set<T: crate::Config>(
        with_cdn: bool,
    ) -> Result<(T::AccountId, T::AccountId), BenchmarkError> {
        let (provider_id, service_provider, payee) = T::BenchmarkHelpers::register_provider(0);
        approve::<T>(provider_id)?;
        let payer = T::BenchmarkHelpers::setup_payer(0, &Pallet::<T>::service_account());

        let (metadata_keys, metadata_values) =
            max_metadata::<T>(T::MaxDataSetMetadataKeys::get(), with_cdn);
        let signature = sign::<T>(
            &payer,
            &AuthorizedOperation::CreateDataSet {
                client_data_set_id: CLIENT_DATA_SET_ID,
                payee,
                metadata: pairs(&metadata_keys, &metadata_values),
            },
        );
        let extra_data = DataSetCreatePayload {
            payer: payer.clone(),
            client_data_set_id: CLIENT_DATA_SET_ID,
            metadata_keys,
            metadata_values,
            signature,
        }
        .encode();

        Pallet::<T>::data_set_created(
            pdp_verifier::<T>().into(),
            DATA_SET_ID,
            service_provider.clone(),
            extra_data,
        )
        .map_err(|_| BenchmarkError::Stop("Data set could not be created."))?;

        Ok((payer, service_provider))
    }

    /// Schedule the first challenge of the data set. Returns its deadline.
    fn start_proving<T: crate::Config>(
        config: &PdpConfigFor<T>,
    ) -> Result<BlockNumberFor<T>, BenchmarkError> {
        let deadline =
            frame_system::Pallet::<T>::block_number().saturating_add(config.max_proving_period);
        Pallet::<T>::next_proving_period(
            pdp_verifier::<T>().into(),
            DATA_SET_ID,
            deadline,
            0,
            Vec::new(),
        )
        .map_err(|_| BenchmarkError::Stop("Proving could not be started."))?;
        Ok(deadline)
    }

    #[benchmark]
    fn data_set_created() -> Result<(), BenchmarkError> {
        /***********  Setup initial conditions: ***********/
        let (provider_id, service_provider, payee) = T::BenchmarkHelpers::register_provider(0);
        approve::<T>(provider_id)?;
        let payer = T::BenchmarkHelpers::setup_payer(0, &Pallet::<T>::service_account());

        // Worst case: every key at its maximum length, and the CDN rails on top of the PDP rail
        let (metadata_keys, metadata_values) =
            max_metadata::<T>(T::MaxDataSetMetadataKeys::get(), true);
        let signature = sign::<T>(
            &payer,
            &AuthorizedOperation::CreateDataSet {
                client_data_set_id: CLIENT_DATA_SET_ID,
                payee: payee.clone(),
                metadata: pairs(&metadata_keys, &metadata_values),
            },
        );
        let extra_data = DataSetCreatePayload {
            payer: payer.clone(),
            client_data_set_id: CLIENT_DATA_SET_ID,
            metadata_keys,
            metadata_values,
            signature,
        }
        .encode();

        /*********** Call the extrinsic to benchmark: ***********/
        #[extrinsic_call]
        _(pdp_verifier::<T>(), DATA_SET_ID, service_provider, extra_data);

        /*********** Post-benchmark checks: ***********/
        let info = DataSets::<T>::get(DATA_SET_ID)
            .ok_or(BenchmarkError::Stop("Data set was not created."))?;
        assert_eq!(info.payer, payer);
        assert_eq!(info.payee, payee);
        assert!(info.cdn_rails.is_some());

        Ok(())
    }

    #[benchmark]
    fn pieces_added(n: Linear<1, 20>) -> Result<(), BenchmarkError> {
        /***********  Setup initial conditions: ***********/
        let (payer, _) = setup_data_set::<T>(true)?;

        let mut piece_cids: Vec<PieceCid<T>> = Vec::new();
        for index in 0..n {
            let piece_cid = T::BenchmarkHelpers::piece_cid(index, TIB_IN_BYTES)
                .try_into()
                .map_err(|_| BenchmarkError::Stop("Piece CID exceeds MaxPieceCidLength."))?;
            piece_cids.push(piece_cid);
        }
        let (keys, values) = max_metadata::<T>(T::MaxPieceMetadataKeys::get(), false);
        let metadata_keys = vec![keys; n as usize];
        let metadata_values = vec![values; n as usize];

        let signature = sign::<T>(
            &payer,
            &AuthorizedOperation::AddPieces {
                client_data_set_id: CLIENT_DATA_SET_ID,
                first_added: 0,
                piece_cids: piece_cids.iter().map(|cid| cid.to_vec()).collect(),
                metadata: metadata_keys
                    .iter()
                    .zip(metadata_values.iter())
                    .map(|(keys, values)| pairs(keys, values))
                    .collect(),
            },
        );
        let extra_data = PiecesAddedPayload {
            signature,
            metadata_keys,
            metadata_values,
        }
        .encode();

        /*********** Call the extrinsic to benchmark: ***********/
        #[extrinsic_call]
        _(pdp_verifier::<T>(), DATA_SET_ID, 0, piece_cids, extra_data);

        /*********** Post-benchmark checks: ***********/
        assert_eq!(NextPieceIds::<T>::get(DATA_SET_ID), n as u64);
        assert_eq!(
            StoredBytes::<T>::get(DATA_SET_ID),
            TIB_IN_BYTES.saturating_mul(n as u64)
        );

        Ok(())
    }

    #[benchmark]
    fn pieces_scheduled_remove(n: Linear<1, 100>) -> Result<(), BenchmarkError> {
        /***********  Setup initial conditions: ***********/
        let (payer, _) = setup_data_set::<T>(false)?;

        let piece_ids: Vec<PieceId> = (0..n as u64).collect();
        let signature = sign::<T>(
            &payer,
            &AuthorizedOperation::SchedulePieceRemovals {
                client_data_set_id: CLIENT_DATA_SET_ID,
                piece_ids: piece_ids.clone(),
            },
        );
        let extra_data = PiecesRemovePayload { signature }.encode();

        /*********** Call the extrinsic to benchmark: ***********/
        #[extrinsic_call]
        _(pdp_verifier::<T>(), DATA_SET_ID, piece_ids.clone(), extra_data);

        /*********** Post-benchmark checks: ***********/
        let expected_event =
            <T as pallet::Config>::RuntimeEvent::from(Event::<T>::PieceRemovalsScheduled {
                data_set_id: DATA_SET_ID,
                piece_ids,
            });
        frame_system::Pallet::<T>::assert_last_event(expected_event.into());

        Ok(())
    }

    #[benchmark]
    fn possession_proven() -> Result<(), BenchmarkError> {
        /***********  Setup initial conditions: ***********/
        setup_data_set::<T>(true)?;
        let config = ensure_pdp_config::<T>();
        let deadline = start_proving::<T>(&config)?;
        frame_system::Pallet::<T>::set_block_number(deadline);

        let challenge_count = T::ChallengesPerProof::get() as u64;

        /*********** Call the extrinsic to benchmark: ***********/
        #[extrinsic_call]
        _(
            pdp_verifier::<T>(),
            DATA_SET_ID,
            TIB_IN_BYTES / BYTES_PER_LEAF,
            H256::zero(),
            challenge_count,
        );

        /*********** Post-benchmark checks: ***********/
        assert!(ProvenPeriods::<T>::contains_key(DATA_SET_ID, 0));

        Ok(())
    }

    #[benchmark]
    fn next_proving_period() -> Result<(), BenchmarkError> {
        /***********  Setup initial conditions: ***********/
        setup_data_set::<T>(true)?;
        let config = ensure_pdp_config::<T>();
        let deadline = start_proving::<T>(&config)?;

        // Worst case: periods were skipped, so faults are recorded, and every rail gets re-rated
        let max_proving_period = config.max_proving_period;
        frame_system::Pallet::<T>::set_block_number(
            deadline
                .saturating_add(max_proving_period.saturating_mul(2u32.into()))
                .saturating_add(1u32.into()),
        );
        let next_deadline = deadline.saturating_add(max_proving_period.saturating_mul(3u32.into()));

        /*********** Call the extrinsic to benchmark: ***********/
        #[extrinsic_call]
        _(
            pdp_verifier::<T>(),
            DATA_SET_ID,
            next_deadline,
            TIB_IN_BYTES / BYTES_PER_LEAF,
            Vec::new(),
        );

        /*********** Post-benchmark checks: ***********/
        let state = ProvingStates::<T>::get(DATA_SET_ID)
            .ok_or(BenchmarkError::Stop("Proving state was removed."))?;
        assert_eq!(state.deadline, Some(next_deadline));
        assert_eq!(StoredBytes::<T>::get(DATA_SET_ID), TIB_IN_BYTES);

        Ok(())
    }

    #[benchmark]
    fn storage_provider_changed() -> Result<(), BenchmarkError> {
        /***********  Setup initial conditions: ***********/
        let (_, old_service_provider) = setup_data_set::<T>(false)?;
        let new_service_provider: T::AccountId = account("NewServiceProvider", 0, 0);

        /*********** Call the extrinsic to benchmark: ***********/
        #[extrinsic_call]
        _(
            pdp_verifier::<T>(),
            DATA_SET_ID,
            old_service_provider,
            new_service_provider.clone(),
            Vec::new(),
        );

        /*********** Post-benchmark checks: ***********/
        let info =
            DataSets::<T>::get(DATA_SET_ID).ok_or(BenchmarkError::Stop("Data set was removed."))?;
        assert_eq!(info.service_provider, new_service_provider);

        Ok(())
    }

    #[benchmark]
    fn terminate_service() -> Result<(), BenchmarkError> {
        /***********  Setup initial conditions: ***********/
        // Worst case: three rails to terminate
        let (payer, _) = setup_data_set::<T>(true)?;

        /*********** Call the extrinsic to benchmark: ***********/
        #[extrinsic_call]
        _(RawOrigin::Signed(payer), DATA_SET_ID);

        /*********** Post-benchmark checks: ***********/
        let info =
            DataSets::<T>::get(DATA_SET_ID).ok_or(BenchmarkError::Stop("Data set was removed."))?;
        assert!(info.payment_end_epoch.is_some());

        Ok(())
    }

    #[benchmark]
    fn add_approved_provider() -> Result<(), BenchmarkError> {
        /***********  Setup initial conditions: ***********/
        // Fill the approved list up to one slot short of its bound
        let max_approved = T::MaxApprovedProviders::get();
        let mut index = 0;
        while Pallet::<T>::approved_providers_count() < max_approved.saturating_sub(1) {
            let (provider_id, _, _) = T::BenchmarkHelpers::register_provider(index);
            approve::<T>(provider_id)?;
            index += 1;
        }
        let (provider_id, _, _) = T::BenchmarkHelpers::register_provider(index);
        let origin = owner_origin::<T>()?;

        /*********** Call the extrinsic to benchmark: ***********/
        #[extrinsic_call]
        _(origin as T::RuntimeOrigin, provider_id);

        /*********** Post-benchmark checks: ***********/
        assert!(Pallet::<T>::is_provider_approved(&provider_id));
        assert_eq!(Pallet::<T>::approved_providers_count(), max_approved);

        Ok(())
    }

    #[benchmark]
    fn remove_approved_provider() -> Result<(), BenchmarkError> {
        /***********  Setup initial conditions: ***********/
        // Full list, removing its first entry so the last one has to be moved
        let max_approved = T::MaxApprovedProviders::get();
        let mut index = 0;
        while Pallet::<T>::approved_providers_count() < max_approved {
            let (provider_id, _, _) = T::BenchmarkHelpers::register_provider(index);
            approve::<T>(provider_id)?;
            index += 1;
        }
        let provider_id = ApprovedProviders::<T>::get()
            .first()
            .copied()
            .ok_or(BenchmarkError::Stop("Approved list is empty."))?;
        let origin = owner_origin::<T>()?;

        /*********** Call the extrinsic to benchmark: ***********/
        #[extrinsic_call]
        _(origin as T::RuntimeOrigin, provider_id, 0);

        /*********** Post-benchmark checks: ***********/
        assert!(!Pallet::<T>::is_provider_approved(&provider_id));
        assert_eq!(
            Pallet::<T>::approved_providers_count(),
            max_approved.saturating_sub(1)
        );

        Ok(())
    }

    #[benchmark]
    fn configure_proving_period() -> Result<(), BenchmarkError> {
        /***********  Setup initial conditions: ***********/
        let origin = owner_origin::<T>()?;
        let max_proving_period: BlockNumberFor<T> = 200u32.into();
        let challenge_window_size: BlockNumberFor<T> = 50u32.into();

        /*********** Call the extrinsic to benchmark: ***********/
        #[extrinsic_call]
        _(
            origin as T::RuntimeOrigin,
            max_proving_period,
            challenge_window_size,
        );

        /*********** Post-benchmark checks: ***********/
        assert_eq!(
            PdpConfiguration::<T>::get(),
            Some(PdpConfig {
                max_proving_period,
                challenge_window_size,
            })
        );

        Ok(())
    }

    #[benchmark]
    fn set_view_contract() -> Result<(), BenchmarkError> {
        /***********  Setup initial conditions: ***********/
        ViewContract::<T>::kill();
        let origin = owner_origin::<T>()?;
        let view_contract: T::AccountId = account("ViewContract", 0, 0);

        /*********** Call the extrinsic to benchmark: ***********/
        #[extrinsic_call]
        _(origin as T::RuntimeOrigin, view_contract.clone());

        /*********** Post-benchmark checks: ***********/
        assert_eq!(ViewContract::<T>::get(), Some(view_contract));

        Ok(())
    }

    impl_benchmark_test_suite! {
            Pallet,
            crate::mock::ExtBuilder::build(),
            crate::mock::Test,
    }
}
