//! Payment rails of data sets: creation, re-rating, termination and settlement validation.

use frame_support::{ensure, pallet_prelude::DispatchResult, traits::Get};
use frame_system::pallet_prelude::BlockNumberFor;
use sp_runtime::{
    traits::{AccountIdConversion, CheckedDiv, CheckedMul, Saturating, Zero},
    ArithmeticError, DispatchError, SaturatedConversion,
};
use wsp_constants::{BYTES_PER_LEAF, TIB_IN_BYTES};
use wsp_traits::{PaymentRailsInterface, PaymentValidation, RailValidator};

use crate::{
    pallet,
    types::{BalanceOf, CdnRails, DataSetId, DataSetInfo, RailIdFor},
    DataSets, Error, Event, Pallet, ProvenPeriods, ProvingStates, RailToDataSet, StoredBytes,
};

impl<T> Pallet<T>
where
    T: pallet::Config,
{
    /// The account of this service: operator of every rail it creates and validator of the PDP
    /// rails.
    pub fn service_account() -> T::AccountId {
        T::PalletId::get().into_account_truncating()
    }

    /// Create the rails of a new data set.
    ///
    /// The PDP rail is created with the service's commission and the creation fee is charged on it
    /// as a one-time payment out of its fixed lockup. With CDN service, a cache-miss rail paying the
    /// Provider and a CDN rail paying the CDN beneficiary are created too.
    pub(crate) fn create_rails_for_data_set(
        payer: &T::AccountId,
        payee: &T::AccountId,
        with_cdn: bool,
    ) -> Result<(RailIdFor<T>, Option<CdnRails<RailIdFor<T>>>), DispatchError> {
        let service = Self::service_account();
        let lockup_period = T::DefaultLockupPeriod::get();
        let creation_fee = T::DataSetCreationFee::get();

        let pdp_rail_id = T::PaymentRails::create_rail(
            payer,
            payee,
            &service,
            Some(&service),
            T::ServiceCommissionBps::get(),
        )?;
        T::PaymentRails::modify_rail_lockup(&pdp_rail_id, lockup_period, creation_fee)?;
        if !creation_fee.is_zero() {
            T::PaymentRails::modify_rail_payment(&pdp_rail_id, Zero::zero(), creation_fee)?;
        }

        if !with_cdn {
            return Ok((pdp_rail_id, None));
        }

        let cache_miss_rail_id = T::PaymentRails::create_rail(payer, payee, &service, None, 0)?;
        T::PaymentRails::modify_rail_lockup(&cache_miss_rail_id, lockup_period, Zero::zero())?;

        let cdn_rail_id =
            T::PaymentRails::create_rail(payer, &T::CdnBeneficiary::get(), &service, None, 0)?;
        T::PaymentRails::modify_rail_lockup(&cdn_rail_id, lockup_period, Zero::zero())?;

        Ok((
            pdp_rail_id,
            Some(CdnRails {
                cache_miss_rail_id,
                cdn_rail_id,
            }),
        ))
    }

    /// Per-epoch rate of storing `bytes` at `price_per_tib_per_month`.
    pub fn rate_for_bytes(
        price_per_tib_per_month: BalanceOf<T>,
        bytes: u64,
    ) -> Result<BalanceOf<T>, DispatchError> {
        let numerator = price_per_tib_per_month
            .checked_mul(&bytes.saturated_into())
            .ok_or(ArithmeticError::Overflow)?;
        let denominator = BalanceOf::<T>::saturated_from(TIB_IN_BYTES)
            .checked_mul(&BalanceOf::<T>::from(T::EpochsPerMonth::get()))
            .ok_or(ArithmeticError::Overflow)?;
        Ok(numerator
            .checked_div(&denominator)
            .ok_or(ArithmeticError::DivisionByZero)?)
    }

    /// Add `added_bytes` to the bytes a data set is charged for and re-rate its rails.
    pub(crate) fn update_rate_for_piece_size_change(
        data_set_id: DataSetId,
        added_bytes: u64,
    ) -> DispatchResult {
        let total_bytes = StoredBytes::<T>::get(data_set_id).saturating_add(added_bytes);
        Self::set_payment_rates(data_set_id, total_bytes)
    }

    /// Charge a data set for the leaves the PDP verifier reports it holds.
    pub(crate) fn sync_rates_with_leaf_count(
        data_set_id: DataSetId,
        leaf_count: u64,
    ) -> DispatchResult {
        Self::set_payment_rates(data_set_id, leaf_count.saturating_mul(BYTES_PER_LEAF))
    }

    /// Record the bytes a data set is charged for and update the rates of its rails accordingly.
    /// Rails of a data set whose termination was requested keep their rates.
    pub(crate) fn set_payment_rates(data_set_id: DataSetId, total_bytes: u64) -> DispatchResult {
        let info = DataSets::<T>::get(data_set_id).ok_or(Error::<T>::DataSetNotFound)?;
        StoredBytes::<T>::insert(data_set_id, total_bytes);

        if info.payment_end_epoch.is_some() {
            return Ok(());
        }

        Self::update_rail_rate(
            data_set_id,
            &info.pdp_rail_id,
            Self::rate_for_bytes(T::StoragePricePerTibPerMonth::get(), total_bytes)?,
        )?;
        if let Some(rails) = info.cdn_rails {
            Self::update_rail_rate(
                data_set_id,
                &rails.cache_miss_rail_id,
                Self::rate_for_bytes(T::CacheMissPricePerTibPerMonth::get(), total_bytes)?,
            )?;
            Self::update_rail_rate(
                data_set_id,
                &rails.cdn_rail_id,
                Self::rate_for_bytes(T::CdnPricePerTibPerMonth::get(), total_bytes)?,
            )?;
        }

        Ok(())
    }

    fn update_rail_rate(
        data_set_id: DataSetId,
        rail_id: &RailIdFor<T>,
        new_rate: BalanceOf<T>,
    ) -> DispatchResult {
        let rail = T::PaymentRails::get_rail(rail_id).ok_or(Error::<T>::InvalidRailId)?;
        if rail.payment_rate == new_rate {
            return Ok(());
        }

        T::PaymentRails::modify_rail_payment(rail_id, new_rate, Zero::zero())?;

        Self::deposit_event(Event::<T>::RailRateUpdated {
            data_set_id,
            rail_id: *rail_id,
            new_rate,
        });

        Ok(())
    }

    /// Terminate every rail of a data set. Returns the end epoch of its PDP rail.
    pub(crate) fn terminate_rails(
        info: &DataSetInfo<T>,
    ) -> Result<BlockNumberFor<T>, DispatchError> {
        let payment_end_epoch = T::PaymentRails::terminate_rail(&info.pdp_rail_id)?;
        if let Some(rails) = info.cdn_rails {
            T::PaymentRails::terminate_rail(&rails.cache_miss_rail_id)?;
            T::PaymentRails::terminate_rail(&rails.cdn_rail_id)?;
        }
        Ok(payment_end_epoch)
    }

    /// Number of epochs in `(from_epoch, to_epoch]` that belong to proven proving periods of a
    /// data set.
    fn proven_epochs_in_range(
        data_set_id: DataSetId,
        activation_epoch: u64,
        max_proving_period: u64,
        from_epoch: u64,
        to_epoch: u64,
    ) -> u64 {
        // Epochs up to the activation epoch belong to no proving period.
        let start = from_epoch.max(activation_epoch);
        if to_epoch <= start || max_proving_period == 0 {
            return 0;
        }

        let first_period = (start - activation_epoch) / max_proving_period;
        let last_period = (to_epoch - activation_epoch - 1) / max_proving_period;

        (first_period..=last_period)
            .filter(|period| ProvenPeriods::<T>::contains_key(data_set_id, period))
            .map(|period| {
                let period_start = activation_epoch + period * max_proving_period;
                let period_end = period_start + max_proving_period;
                period_end.min(to_epoch) - period_start.max(start)
            })
            .sum()
    }
}

impl<T: pallet::Config> RailValidator for Pallet<T> {
    type RailId = RailIdFor<T>;
    type Balance = BalanceOf<T>;
    type BlockNumber = BlockNumberFor<T>;

    /// Pro-rate a settlement of a rail of this service by the epochs that were actually proven.
    ///
    /// CDN rails are not validated. PDP rails are only paid for epochs of proven periods, and the
    /// current period cannot be settled until it is proven.
    fn validate_payment(
        rail_id: &Self::RailId,
        proposed_amount: Self::Balance,
        from_epoch: Self::BlockNumber,
        to_epoch: Self::BlockNumber,
    ) -> Result<PaymentValidation<Self::Balance, Self::BlockNumber>, DispatchError> {
        ensure!(from_epoch <= to_epoch, Error::<T>::InvalidEpochRange);

        let data_set_id = RailToDataSet::<T>::get(rail_id).ok_or(Error::<T>::RailNotAssociated)?;
        let info = DataSets::<T>::get(data_set_id).ok_or(Error::<T>::DataSetNotFound)?;

        if info.pdp_rail_id != *rail_id {
            return Ok(PaymentValidation {
                modified_amount: proposed_amount,
                settle_upto: to_epoch,
            });
        }

        let nothing_to_settle = PaymentValidation {
            modified_amount: Zero::zero(),
            settle_upto: from_epoch,
        };
        let Some(state) = ProvingStates::<T>::get(data_set_id) else {
            return Ok(nothing_to_settle);
        };
        let config = Self::pdp_config()?;

        // The period containing the current epoch can only be settled once proven.
        let now = frame_system::Pallet::<T>::block_number();
        let current_period = Self::period_of(&state, now, &config);
        let settle_upto = if now > state.activation_epoch
            && !ProvenPeriods::<T>::contains_key(data_set_id, current_period)
        {
            let current_period_start = Self::period_deadline(&state, current_period, &config)
                .saturating_sub(config.max_proving_period);
            to_epoch.min(current_period_start)
        } else {
            to_epoch
        };
        if settle_upto <= from_epoch {
            return Ok(nothing_to_settle);
        }

        let proven_epochs = Self::proven_epochs_in_range(
            data_set_id,
            state.activation_epoch.saturated_into(),
            config.max_proving_period.saturated_into(),
            from_epoch.saturated_into(),
            settle_upto.saturated_into(),
        );
        let total_epochs: u64 = to_epoch.saturating_sub(from_epoch).saturated_into();

        let modified_amount = if proven_epochs == total_epochs {
            proposed_amount
        } else {
            proposed_amount
                .checked_mul(&proven_epochs.saturated_into())
                .ok_or(ArithmeticError::Overflow)?
                / BalanceOf::<T>::saturated_from(total_epochs)
        };

        Ok(PaymentValidation {
            modified_amount,
            settle_upto,
        })
    }
}
