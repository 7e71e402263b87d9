use codec::DecodeAll;
use frame_support::{ensure, pallet_prelude::DispatchResult, traits::Get};
use frame_system::pallet_prelude::{BlockNumberFor, OriginFor};
use scale_info::prelude::vec::Vec;
use sp_core::H256;
use sp_runtime::{
    traits::{Saturating, Zero},
    DispatchError, SaturatedConversion,
};
use wsp_constants::WITH_CDN_METADATA_KEY;
use wsp_traits::{PieceSizeResolver, ServiceProviderRegistryInterface};

use crate::{
    pallet,
    types::{
        AuthorizedOperation, ClientDataSetId, DataSetCreatePayload, DataSetId, DataSetInfo,
        MetadataPairs, MetadataScope, PdpConfigFor, PeriodIndex, PieceCid, PieceId,
        PiecesAddedPayload, PiecesRemovePayload, ProvingState, ProvingStateFor,
    },
    ClientDataSets, DataSets, Error, Event, NextPieceIds, Pallet, PdpConfiguration, ProvenPeriods,
    ProvingStates, RailToDataSet, StoredBytes, LOG_TARGET,
};

impl<T> Pallet<T>
where
    T: pallet::Config,
{
    /// Check that `origin` is signed by the PDP verifier account.
    pub(crate) fn ensure_pdp_verifier(origin: OriginFor<T>) -> DispatchResult {
        let who = frame_system::ensure_signed(origin)?;
        let expected = T::PdpVerifierAccount::get();
        if who != expected {
            log::debug!(
                target: LOG_TARGET,
                "Lifecycle callback rejected: caller {:?} is not the PDP verifier {:?}",
                who,
                expected
            );
            return Err(Error::<T>::OnlyPdpVerifierAllowed.into());
        }
        Ok(())
    }

    /// Check that the payment end epoch of a data set, if any, has not elapsed.
    pub(crate) fn ensure_not_beyond_end_epoch(
        data_set_id: DataSetId,
        info: &DataSetInfo<T>,
    ) -> DispatchResult {
        if let Some(end_epoch) = info.payment_end_epoch {
            let now = frame_system::Pallet::<T>::block_number();
            if now > end_epoch {
                log::debug!(
                    target: LOG_TARGET,
                    "Data set {} is beyond its payment end epoch {:?} (current epoch {:?})",
                    data_set_id,
                    end_epoch,
                    now
                );
                return Err(Error::<T>::DataSetPaymentBeyondEndEpoch.into());
            }
        }
        Ok(())
    }

    /// Check that a data set can still be mutated: its payment end epoch has not elapsed and
    /// termination has not been requested.
    pub(crate) fn ensure_data_set_active(
        data_set_id: DataSetId,
        info: &DataSetInfo<T>,
    ) -> DispatchResult {
        Self::ensure_not_beyond_end_epoch(data_set_id, info)?;
        if let Some(end_epoch) = info.payment_end_epoch {
            log::debug!(
                target: LOG_TARGET,
                "Data set {} is terminating, payments end at epoch {:?}",
                data_set_id,
                end_epoch
            );
            return Err(Error::<T>::DataSetPaymentAlreadyTerminated.into());
        }
        Ok(())
    }

    /// Get the proving period configuration, failing if it was never set.
    pub(crate) fn pdp_config() -> Result<PdpConfigFor<T>, DispatchError> {
        PdpConfiguration::<T>::get().ok_or(Error::<T>::ProvingPeriodNotConfigured.into())
    }

    /// Check whether an account is the all-zero account.
    pub(crate) fn is_zero_account(who: &T::AccountId) -> bool {
        codec::Encode::encode(who).iter().all(|byte| *byte == 0)
    }

    /// This function holds the logic that checks if a data set can be created and, if so, stores
    /// its metadata, creates its rails and persists it.
    pub(crate) fn do_data_set_created(
        data_set_id: DataSetId,
        service_provider: T::AccountId,
        extra_data: &[u8],
    ) -> DispatchResult {
        let payload = DataSetCreatePayload::<T::AccountId>::decode_all(&mut &extra_data[..])
            .map_err(|_| Error::<T>::InvalidExtraData)?;

        // Check that the data set does not exist yet
        ensure!(
            !DataSets::<T>::contains_key(data_set_id),
            Error::<T>::DataSetAlreadyExists
        );

        // Check that the service provider is a registered Provider
        ensure!(
            T::Registry::is_registered_provider(&service_provider),
            Error::<T>::ProviderNotRegistered
        );
        let provider_id = T::Registry::get_provider_id_by_address(&service_provider)
            .ok_or(Error::<T>::ProviderNotRegistered)?;
        let provider_info =
            T::Registry::get_provider(&provider_id).ok_or(Error::<T>::ProviderNotRegistered)?;

        // Check that the Provider is approved by the service
        ensure!(
            Self::is_provider_approved(&provider_id),
            Error::<T>::ProviderNotApproved
        );

        // Check that the payer has not used this client data set ID before
        ensure!(
            !ClientDataSets::<T>::contains_key(&payload.payer, payload.client_data_set_id),
            Error::<T>::ClientDataSetAlreadyRegistered
        );

        Self::ensure_metadata_lists_match(&payload.metadata_keys, &payload.metadata_values)?;

        // Check that the payer authorized the creation
        let operation = AuthorizedOperation::CreateDataSet {
            client_data_set_id: payload.client_data_set_id,
            payee: provider_info.payee.clone(),
            metadata: Self::metadata_pairs(&payload.metadata_keys, &payload.metadata_values),
        };
        Self::verify_authorization(&operation, &payload.signature, &payload.payer)?;

        let with_cdn = payload
            .metadata_keys
            .iter()
            .any(|key| key.as_slice() == WITH_CDN_METADATA_KEY);

        Self::set_metadata_entries(
            MetadataScope::DataSet(data_set_id),
            payload.metadata_keys.clone(),
            payload.metadata_values.clone(),
        )?;

        let (pdp_rail_id, cdn_rails) =
            Self::create_rails_for_data_set(&payload.payer, &provider_info.payee, with_cdn)?;

        DataSets::<T>::insert(
            data_set_id,
            DataSetInfo {
                payer: payload.payer.clone(),
                service_provider: service_provider.clone(),
                payee: provider_info.payee.clone(),
                provider_id,
                client_data_set_id: payload.client_data_set_id,
                pdp_rail_id,
                cdn_rails,
                payment_end_epoch: None,
            },
        );
        ClientDataSets::<T>::insert(&payload.payer, payload.client_data_set_id, data_set_id);
        RailToDataSet::<T>::insert(pdp_rail_id, data_set_id);
        if let Some(rails) = cdn_rails {
            RailToDataSet::<T>::insert(rails.cache_miss_rail_id, data_set_id);
            RailToDataSet::<T>::insert(rails.cdn_rail_id, data_set_id);
        }

        Self::deposit_event(Event::<T>::DataSetCreated {
            data_set_id,
            provider_id,
            service_provider,
            payer: payload.payer,
            payee: provider_info.payee,
            pdp_rail_id,
            cache_miss_rail_id: cdn_rails.map(|rails| rails.cache_miss_rail_id),
            cdn_rail_id: cdn_rails.map(|rails| rails.cdn_rail_id),
            metadata_keys: payload.metadata_keys,
            metadata_values: payload.metadata_values,
        });

        Ok(())
    }

    /// This function holds the logic that checks if pieces can be added to a data set and, if so,
    /// stores their metadata, advances the piece count and updates the rates of the data set.
    pub(crate) fn do_pieces_added(
        data_set_id: DataSetId,
        first_added: PieceId,
        piece_cids: Vec<PieceCid<T>>,
        extra_data: &[u8],
    ) -> DispatchResult {
        let info = DataSets::<T>::get(data_set_id).ok_or(Error::<T>::DataSetNotFound)?;
        Self::ensure_data_set_active(data_set_id, &info)?;

        let payload = PiecesAddedPayload::decode_all(&mut &extra_data[..])
            .map_err(|_| Error::<T>::InvalidExtraData)?;

        let piece_count = piece_cids.len();
        ensure!(
            payload.metadata_keys.len() == piece_count
                && payload.metadata_values.len() == piece_count,
            Error::<T>::MetadataArrayCountMismatch {
                metadata_count: Self::saturated_u8(
                    payload.metadata_keys.len().max(payload.metadata_values.len())
                ),
                piece_count: Self::saturated_u8(piece_count),
            }
        );

        ensure!(
            first_added == NextPieceIds::<T>::get(data_set_id),
            Error::<T>::InvalidFirstAddedPiece
        );

        for (keys, values) in payload.metadata_keys.iter().zip(payload.metadata_values.iter()) {
            Self::ensure_metadata_lists_match(keys, values)?;
        }

        // Check that the payer authorized the addition
        let operation = AuthorizedOperation::AddPieces {
            client_data_set_id: info.client_data_set_id,
            first_added,
            piece_cids: piece_cids.iter().map(|cid| cid.to_vec()).collect(),
            metadata: payload
                .metadata_keys
                .iter()
                .zip(payload.metadata_values.iter())
                .map(|(keys, values)| Self::metadata_pairs(keys, values))
                .collect(),
        };
        Self::verify_authorization(&operation, &payload.signature, &info.payer)?;

        let mut added_bytes: u64 = 0;
        let mut piece_id = first_added;
        for ((piece_cid, keys), values) in piece_cids
            .into_iter()
            .zip(payload.metadata_keys)
            .zip(payload.metadata_values)
        {
            Self::set_metadata_entries(
                MetadataScope::Piece(data_set_id, piece_id),
                keys.clone(),
                values.clone(),
            )?;

            added_bytes =
                added_bytes.saturating_add(T::PieceSizes::piece_size(&piece_cid).unwrap_or(0));

            Self::deposit_event(Event::<T>::PieceAdded {
                data_set_id,
                piece_id,
                piece_cid,
                metadata_keys: keys,
                metadata_values: values,
            });

            piece_id = piece_id.saturating_add(1);
        }
        NextPieceIds::<T>::insert(data_set_id, piece_id);

        Self::update_rate_for_piece_size_change(data_set_id, added_bytes)
    }

    /// This function holds the logic that checks if the payer authorized the removal of pieces.
    pub(crate) fn do_pieces_scheduled_remove(
        data_set_id: DataSetId,
        piece_ids: &[PieceId],
        extra_data: &[u8],
    ) -> DispatchResult {
        let info = DataSets::<T>::get(data_set_id).ok_or(Error::<T>::DataSetNotFound)?;
        Self::ensure_not_beyond_end_epoch(data_set_id, &info)?;

        let payload = PiecesRemovePayload::decode_all(&mut &extra_data[..])
            .map_err(|_| Error::<T>::InvalidExtraData)?;

        let operation = AuthorizedOperation::SchedulePieceRemovals {
            client_data_set_id: info.client_data_set_id,
            piece_ids: piece_ids.to_vec(),
        };
        Self::verify_authorization(&operation, &payload.signature, &info.payer)
    }

    /// This function holds the logic that checks if a possession proof is on time and, if so,
    /// flags the current proving period as proven. Returns the index of the proven period.
    pub(crate) fn do_possession_proven(
        data_set_id: DataSetId,
        leaf_count: u64,
        seed: H256,
        challenge_count: u64,
    ) -> Result<PeriodIndex, DispatchError> {
        let info = DataSets::<T>::get(data_set_id).ok_or(Error::<T>::DataSetNotFound)?;
        Self::ensure_not_beyond_end_epoch(data_set_id, &info)?;

        let config = Self::pdp_config()?;
        let mut state =
            ProvingStates::<T>::get(data_set_id).ok_or(Error::<T>::ProvingNotStarted)?;
        let deadline = state.deadline.ok_or(Error::<T>::ProvingNotStarted)?;

        ensure!(
            !state.proven_this_period,
            Error::<T>::ProofAlreadySubmitted
        );
        ensure!(
            challenge_count >= T::ChallengesPerProof::get() as u64,
            Error::<T>::InvalidChallengeCount
        );

        let now = frame_system::Pallet::<T>::block_number();
        ensure!(
            now >= deadline.saturating_sub(config.challenge_window_size),
            Error::<T>::ChallengeWindowNotOpen
        );
        ensure!(now <= deadline, Error::<T>::ProvingPeriodPassed);

        let period = Self::period_of(&state, deadline, &config);
        state.proven_this_period = true;
        ProvingStates::<T>::insert(data_set_id, state);
        ProvenPeriods::<T>::insert(data_set_id, period, ());

        log::debug!(
            target: LOG_TARGET,
            "Data set {} proven for period {} ({} leaves, seed {:?})",
            data_set_id,
            period,
            leaf_count,
            seed
        );

        Ok(period)
    }

    /// This function holds the logic that closes the current proving period of a data set and
    /// schedules its next challenge. Returns the new deadline, `None` if the data set got parked.
    pub(crate) fn do_next_proving_period(
        data_set_id: DataSetId,
        challenge_epoch: BlockNumberFor<T>,
        leaf_count: u64,
    ) -> Result<Option<BlockNumberFor<T>>, DispatchError> {
        let info = DataSets::<T>::get(data_set_id).ok_or(Error::<T>::DataSetNotFound)?;
        Self::ensure_not_beyond_end_epoch(data_set_id, &info)?;

        let config = Self::pdp_config()?;
        let now = frame_system::Pallet::<T>::block_number();
        let parking = challenge_epoch.is_zero();

        let new_state = match ProvingStates::<T>::get(data_set_id) {
            // First call: proving starts now.
            None => {
                ensure!(!parking, Error::<T>::InvalidChallengeEpoch);
                let deadline = now.saturating_add(config.max_proving_period);
                Self::ensure_challenge_epoch_in_window(challenge_epoch, deadline, &config)?;
                ProvingState {
                    activation_epoch: now,
                    deadline: Some(deadline),
                    proven_this_period: false,
                }
            }
            // Parked data set: resume in the period that contains the current epoch.
            Some(state @ ProvingState { deadline: None, .. }) => {
                if parking {
                    state
                } else {
                    let period = Self::period_of(&state, now, &config);
                    let deadline = Self::period_deadline(&state, period, &config);
                    Self::ensure_challenge_epoch_in_window(challenge_epoch, deadline, &config)?;
                    ProvingState {
                        activation_epoch: state.activation_epoch,
                        deadline: Some(deadline),
                        proven_this_period: ProvenPeriods::<T>::contains_key(data_set_id, period),
                    }
                }
            }
            Some(ProvingState {
                activation_epoch,
                deadline: Some(deadline),
                proven_this_period,
            }) => {
                let max_proving_period: u64 = config.max_proving_period.saturated_into();

                // Whole periods that closed after the deadline without being scheduled.
                let late: u64 = now.saturating_sub(deadline).saturated_into();
                let periods_skipped = late.saturating_sub(1) / max_proving_period.max(1);
                let periods_faulted = periods_skipped + if proven_this_period { 0 } else { 1 };
                if periods_faulted > 0 {
                    Self::deposit_event(Event::<T>::FaultRecord {
                        data_set_id,
                        periods_faulted,
                        deadline,
                    });
                }

                if parking {
                    ProvingState {
                        activation_epoch,
                        deadline: None,
                        proven_this_period: false,
                    }
                } else {
                    let next_deadline = deadline.saturating_add(
                        max_proving_period
                            .saturating_mul(periods_skipped.saturating_add(1))
                            .saturated_into(),
                    );
                    Self::ensure_challenge_epoch_in_window(
                        challenge_epoch,
                        next_deadline,
                        &config,
                    )?;
                    ProvingState {
                        activation_epoch,
                        deadline: Some(next_deadline),
                        proven_this_period: false,
                    }
                }
            }
        };

        let deadline = new_state.deadline;
        ProvingStates::<T>::insert(data_set_id, new_state);

        if info.payment_end_epoch.is_none() {
            Self::sync_rates_with_leaf_count(data_set_id, leaf_count)?;
        }

        Ok(deadline)
    }

    /// This function holds the logic that checks if a data set can be reassigned and, if so,
    /// records its new service provider.
    pub(crate) fn do_storage_provider_changed(
        data_set_id: DataSetId,
        old_service_provider: &T::AccountId,
        new_service_provider: &T::AccountId,
    ) -> DispatchResult {
        DataSets::<T>::try_mutate(data_set_id, |maybe_info| {
            let info = maybe_info.as_mut().ok_or(Error::<T>::DataSetNotFound)?;
            Self::ensure_data_set_active(data_set_id, info)?;

            ensure!(
                info.service_provider == *old_service_provider,
                Error::<T>::OldServiceProviderMismatch
            );
            ensure!(
                !Self::is_zero_account(new_service_provider),
                Error::<T>::InvalidServiceProvider
            );

            info.service_provider = new_service_provider.clone();
            Ok(())
        })
    }

    /// This function holds the logic that checks if `caller` can terminate the service of a data
    /// set and, if so, terminates its rails and records the payment end epoch.
    pub(crate) fn do_terminate_service(
        caller: &T::AccountId,
        data_set_id: DataSetId,
    ) -> Result<(DataSetInfo<T>, BlockNumberFor<T>), DispatchError> {
        DataSets::<T>::try_mutate(data_set_id, |maybe_info| {
            let info = maybe_info.as_mut().ok_or(Error::<T>::DataSetNotFound)?;

            if *caller != info.payer && *caller != info.service_provider {
                log::debug!(
                    target: LOG_TARGET,
                    "Termination of data set {} rejected: caller {:?} is neither the payer {:?} nor the service provider {:?}",
                    data_set_id,
                    caller,
                    info.payer,
                    info.service_provider
                );
                return Err(Error::<T>::CallerNotPayerOrPayee.into());
            }

            Self::ensure_data_set_active(data_set_id, info)?;

            let payment_end_epoch = Self::terminate_rails(info)?;
            info.payment_end_epoch = Some(payment_end_epoch);

            Ok((info.clone(), payment_end_epoch))
        })
    }

    /// Index of the proving period `epoch` belongs to. Period `k` covers the epochs in
    /// `(activation + k * max, activation + (k + 1) * max]`.
    pub(crate) fn period_of(
        state: &ProvingStateFor<T>,
        epoch: BlockNumberFor<T>,
        config: &PdpConfigFor<T>,
    ) -> PeriodIndex {
        let max_proving_period: u64 = config.max_proving_period.saturated_into();
        let elapsed: u64 = epoch
            .saturating_sub(state.activation_epoch)
            .saturated_into();
        elapsed.saturating_sub(1) / max_proving_period.max(1)
    }

    /// Deadline (last epoch) of the proving period with index `period`.
    pub(crate) fn period_deadline(
        state: &ProvingStateFor<T>,
        period: PeriodIndex,
        config: &PdpConfigFor<T>,
    ) -> BlockNumberFor<T> {
        let max_proving_period: u64 = config.max_proving_period.saturated_into();
        state.activation_epoch.saturating_add(
            period
                .saturating_add(1)
                .saturating_mul(max_proving_period)
                .saturated_into(),
        )
    }

    fn ensure_challenge_epoch_in_window(
        challenge_epoch: BlockNumberFor<T>,
        deadline: BlockNumberFor<T>,
        config: &PdpConfigFor<T>,
    ) -> DispatchResult {
        let window_start = deadline.saturating_sub(config.challenge_window_size);
        ensure!(
            challenge_epoch >= window_start && challenge_epoch <= deadline,
            Error::<T>::InvalidChallengeEpoch
        );
        Ok(())
    }

    /// Check that a list of metadata keys and its list of values have the same length.
    pub(crate) fn ensure_metadata_lists_match(
        keys: &[Vec<u8>],
        values: &[Vec<u8>],
    ) -> DispatchResult {
        ensure!(
            keys.len() == values.len(),
            Error::<T>::MetadataKeyAndValueLengthMismatch {
                keys_count: Self::saturated_u8(keys.len()),
                values_count: Self::saturated_u8(values.len()),
            }
        );
        Ok(())
    }

    fn metadata_pairs(keys: &[Vec<u8>], values: &[Vec<u8>]) -> MetadataPairs {
        keys.iter().cloned().zip(values.iter().cloned()).collect()
    }

    /// Numeric error context is carried as `u8`, saturating at 255.
    pub(crate) fn saturated_u8(value: impl TryInto<u8>) -> u8 {
        value.try_into().unwrap_or(u8::MAX)
    }

    /// Find the data set a payer created with a given client data set ID.
    pub fn data_set_of_client(
        payer: &T::AccountId,
        client_data_set_id: ClientDataSetId,
    ) -> Option<DataSetId> {
        ClientDataSets::<T>::get(payer, client_data_set_id)
    }

    /// The number of bytes a data set is currently charged for.
    pub fn stored_bytes(data_set_id: DataSetId) -> u64 {
        StoredBytes::<T>::get(data_set_id)
    }
}
