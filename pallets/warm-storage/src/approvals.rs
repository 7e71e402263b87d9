use frame_support::{ensure, pallet_prelude::DispatchResult};
use scale_info::prelude::vec::Vec;
use sp_runtime::traits::Zero;
use wsp_traits::ServiceProviderRegistryInterface;

use crate::{
    pallet, types::ProviderIdFor, ApprovedProviderIndex, ApprovedProviders, Error, Pallet,
};

impl<T> Pallet<T>
where
    T: pallet::Config,
{
    /// This function holds the logic that checks if a Provider can be approved and, if so, appends
    /// it to the approved list.
    pub(crate) fn do_add_approved_provider(provider_id: ProviderIdFor<T>) -> DispatchResult {
        ensure!(!provider_id.is_zero(), Error::<T>::InvalidProviderId);
        ensure!(
            T::Registry::get_provider(&provider_id).is_some(),
            Error::<T>::ProviderNotRegistered
        );
        ensure!(
            !ApprovedProviderIndex::<T>::contains_key(&provider_id),
            Error::<T>::ProviderAlreadyApproved
        );

        ApprovedProviders::<T>::try_mutate(|approved| -> DispatchResult {
            let index = approved.len() as u32;
            approved
                .try_push(provider_id)
                .map_err(|_| Error::<T>::TooManyApprovedProviders)?;
            ApprovedProviderIndex::<T>::insert(provider_id, index);
            Ok(())
        })
    }

    /// This function holds the logic that removes a Provider from the approved list.
    ///
    /// The last Provider of the list takes the place of the removed one, so `index_hint` must be
    /// the position the Provider currently has.
    pub(crate) fn do_remove_approved_provider(
        provider_id: ProviderIdFor<T>,
        index_hint: u32,
    ) -> DispatchResult {
        let index = ApprovedProviderIndex::<T>::get(&provider_id)
            .ok_or(Error::<T>::ProviderNotInApprovedList)?;
        ensure!(index == index_hint, Error::<T>::ApprovedProviderIndexMismatch);

        ApprovedProviders::<T>::try_mutate(|approved| -> DispatchResult {
            let position = index as usize;
            ensure!(
                approved.get(position) == Some(&provider_id),
                Error::<T>::ApprovedProviderIndexMismatch
            );
            approved.swap_remove(position);
            if let Some(moved) = approved.get(position) {
                ApprovedProviderIndex::<T>::insert(moved, index);
            }
            Ok(())
        })?;
        ApprovedProviderIndex::<T>::remove(&provider_id);

        Ok(())
    }

    /// Check if a Provider is approved to create data sets.
    pub fn is_provider_approved(provider_id: &ProviderIdFor<T>) -> bool {
        ApprovedProviderIndex::<T>::contains_key(provider_id)
    }

    /// Get up to `limit` approved Providers starting at position `offset`. A zero `limit` returns
    /// every Provider from `offset` on.
    pub fn get_approved_providers(offset: u32, limit: u32) -> Vec<ProviderIdFor<T>> {
        let limit = if limit == 0 {
            usize::MAX
        } else {
            limit as usize
        };
        ApprovedProviders::<T>::get()
            .iter()
            .skip(offset as usize)
            .take(limit)
            .copied()
            .collect()
    }

    /// Number of approved Providers.
    pub fn approved_providers_count() -> u32 {
        ApprovedProviders::<T>::decode_len().unwrap_or(0) as u32
    }
}
