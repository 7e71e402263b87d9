// This file is part of StorageHub.

// Copyright (C) Moonsong Labs Ltd.
// SPDX-License-Identifier: Apache-2.0

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Migration from storage version 0 to 1.
//!
//! In version 0, `DataSetInfo` used zero as "absent" for the CDN rail IDs and as "active" for the
//! payment end epoch. Version 1 makes both optional and adds the `RailToDataSet` index.
//!
//! ## Migration Logic
//!
//! - `cache_miss_rail_id == 0 && cdn_rail_id == 0` -> `cdn_rails: None`
//! - both non-zero -> `cdn_rails: Some(CdnRails { .. })`
//! - only one of them non-zero -> `cdn_rails: None`, logged as a warning
//! - `payment_end_epoch == 0` -> `None`, otherwise `Some(payment_end_epoch)`
//! - every rail of every data set is indexed in `RailToDataSet`
//! - the view companion account given by `ViewContractAddress` is stored, unless one is already set

use crate::{
    pallet::Pallet,
    types::{CdnRails, ClientDataSetId, DataSetId, DataSetInfo, ProviderIdFor, RailIdFor},
    Config,
};
use codec::{Decode, Encode};
use frame_support::{
    pallet_prelude::*,
    storage_alias,
    traits::{Get, UncheckedOnRuntimeUpgrade},
    weights::Weight,
};
use frame_system::pallet_prelude::BlockNumberFor;
use scale_info::TypeInfo;
use sp_runtime::traits::Zero;

#[cfg(feature = "try-runtime")]
use sp_runtime::TryRuntimeError;
#[cfg(feature = "try-runtime")]
use sp_std::vec::Vec;

/// Module containing the old (v0) storage format.
///
/// Before running this migration, the storage alias defined here represents the
/// on-chain storage format.
pub mod v0 {
    use super::*;

    /// V0 representation of `DataSetInfo`.
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
    pub struct DataSetInfoV0<T: Config> {
        pub payer: T::AccountId,
        pub service_provider: T::AccountId,
        pub payee: T::AccountId,
        pub provider_id: ProviderIdFor<T>,
        pub client_data_set_id: ClientDataSetId,
        pub pdp_rail_id: RailIdFor<T>,
        /// Zero if the data set has no CDN service.
        pub cache_miss_rail_id: RailIdFor<T>,
        /// Zero if the data set has no CDN service.
        pub cdn_rail_id: RailIdFor<T>,
        /// Zero while the data set is active.
        pub payment_end_epoch: BlockNumberFor<T>,
    }

    /// Storage alias for the old DataSets map with v0 format.
    #[storage_alias]
    pub type DataSets<T: Config> =
        StorageMap<Pallet<T>, Blake2_128Concat, DataSetId, DataSetInfoV0<T>>;
}

/// Implements [`UncheckedOnRuntimeUpgrade`], migrating the state of this pallet from V0 to V1.
///
/// `ViewContractAddress` is the view companion account to set as part of the upgrade, if any.
pub struct InnerMigrateV0ToV1<T: Config, ViewContractAddress>(
    core::marker::PhantomData<(T, ViewContractAddress)>,
);

impl<T, ViewContractAddress> UncheckedOnRuntimeUpgrade
    for InnerMigrateV0ToV1<T, ViewContractAddress>
where
    T: Config,
    ViewContractAddress: Get<Option<T::AccountId>>,
{
    /// Return the count of existing data sets so we can verify the migration.
    #[cfg(feature = "try-runtime")]
    fn pre_upgrade() -> Result<Vec<u8>, TryRuntimeError> {
        let count = v0::DataSets::<T>::iter().count() as u32;
        log::info!(
            target: "runtime::warm-storage",
            "Pre-upgrade: Found {} data sets to migrate",
            count
        );

        Ok(count.encode())
    }

    /// Migrate the storage from V0 to V1.
    fn on_runtime_upgrade() -> Weight {
        let mut reads: u64 = 0;
        let mut writes: u64 = 0;

        // Collect all keys first to avoid iterator invalidation
        let keys: sp_std::vec::Vec<_> = v0::DataSets::<T>::iter_keys().collect();

        for data_set_id in keys {
            reads += 1;

            let Some(old_info) = v0::DataSets::<T>::take(data_set_id) else {
                continue;
            };

            let cdn_rails = match (
                old_info.cache_miss_rail_id.is_zero(),
                old_info.cdn_rail_id.is_zero(),
            ) {
                (true, true) => None,
                (false, false) => Some(CdnRails {
                    cache_miss_rail_id: old_info.cache_miss_rail_id,
                    cdn_rail_id: old_info.cdn_rail_id,
                }),
                _ => {
                    log::warn!(
                        target: "runtime::warm-storage",
                        "Data set {} has a partial CDN rail pair ({:?}, {:?}), dropping it",
                        data_set_id,
                        old_info.cache_miss_rail_id,
                        old_info.cdn_rail_id
                    );
                    None
                }
            };
            let payment_end_epoch = if old_info.payment_end_epoch.is_zero() {
                None
            } else {
                Some(old_info.payment_end_epoch)
            };

            crate::RailToDataSet::<T>::insert(old_info.pdp_rail_id, data_set_id);
            writes += 1;
            if let Some(rails) = cdn_rails {
                crate::RailToDataSet::<T>::insert(rails.cache_miss_rail_id, data_set_id);
                crate::RailToDataSet::<T>::insert(rails.cdn_rail_id, data_set_id);
                writes += 2;
            }

            let new_info = DataSetInfo::<T> {
                payer: old_info.payer,
                service_provider: old_info.service_provider,
                payee: old_info.payee,
                provider_id: old_info.provider_id,
                client_data_set_id: old_info.client_data_set_id,
                pdp_rail_id: old_info.pdp_rail_id,
                cdn_rails,
                payment_end_epoch,
            };

            // Write the new format
            crate::DataSets::<T>::insert(data_set_id, new_info);
            writes += 1;
        }

        if let Some(view_contract) = ViewContractAddress::get() {
            reads += 1;
            if !crate::ViewContract::<T>::exists() {
                crate::ViewContract::<T>::put(view_contract);
                writes += 1;
            }
        }

        log::info!(
            target: "runtime::warm-storage",
            "Migration complete: {} reads, {} writes",
            reads,
            writes
        );

        T::DbWeight::get().reads_writes(reads, writes)
    }

    /// Verify the migration was successful.
    #[cfg(feature = "try-runtime")]
    fn post_upgrade(state: Vec<u8>) -> Result<(), TryRuntimeError> {
        let old_count = u32::decode(&mut &state[..])
            .map_err(|_| TryRuntimeError::Other("Failed to decode old count"))?;

        let new_count = crate::DataSets::<T>::iter().count() as u32;

        ensure!(
            old_count == new_count,
            TryRuntimeError::Other("Migration failed: count mismatch")
        );

        for (data_set_id, info) in crate::DataSets::<T>::iter() {
            ensure!(
                crate::RailToDataSet::<T>::get(info.pdp_rail_id) == Some(data_set_id),
                TryRuntimeError::Other("Migration failed: PDP rail not indexed")
            );
        }

        log::info!(
            target: "runtime::warm-storage",
            "Post-upgrade: Successfully migrated {} data sets",
            new_count
        );

        Ok(())
    }
}

/// [`UncheckedOnRuntimeUpgrade`] implementation [`InnerMigrateV0ToV1`] wrapped in a
/// [`VersionedMigration`](frame_support::migrations::VersionedMigration), which ensures that:
/// - The migration only runs once when the on-chain storage version is 0
/// - The on-chain storage version is updated to `1` after the migration is complete
/// - Reads/Writes from checking/setting the on-chain storage version are accounted for
pub type MigrateV0ToV1<T, ViewContractAddress> = frame_support::migrations::VersionedMigration<
    0, // The migration will only execute when the on-chain storage version is 0
    1, // The on-chain storage version will be set to 1 after the migration is complete
    InnerMigrateV0ToV1<T, ViewContractAddress>,
    Pallet<T>,
    <T as frame_system::Config>::DbWeight,
>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ExtBuilder, Test};
    use frame_support::traits::{GetStorageVersion, OnRuntimeUpgrade, StorageVersion};

    type NoViewContract = ();

    frame_support::parameter_types! {
        pub const SomeViewContract: Option<u64> = Some(77);
    }

    /// Helper to create a v0 data set for testing.
    fn create_v0_data_set(
        pdp_rail_id: u64,
        cache_miss_rail_id: u64,
        cdn_rail_id: u64,
        payment_end_epoch: u64,
    ) -> v0::DataSetInfoV0<Test> {
        v0::DataSetInfoV0 {
            payer: 10,
            service_provider: 20,
            payee: 21,
            provider_id: 1,
            client_data_set_id: 5,
            pdp_rail_id,
            cache_miss_rail_id,
            cdn_rail_id,
            payment_end_epoch,
        }
    }

    #[test]
    fn migration_works_with_no_data_sets() {
        ExtBuilder::build().execute_with(|| {
            assert_eq!(v0::DataSets::<Test>::iter().count(), 0);

            let weight = InnerMigrateV0ToV1::<Test, NoViewContract>::on_runtime_upgrade();

            assert_eq!(
                weight,
                <Test as frame_system::Config>::DbWeight::get().reads_writes(0, 0)
            );
            assert_eq!(crate::DataSets::<Test>::iter().count(), 0);
            assert!(crate::ViewContract::<Test>::get().is_none());
        });
    }

    #[test]
    fn migration_turns_zero_sentinels_into_none() {
        ExtBuilder::build().execute_with(|| {
            v0::DataSets::<Test>::insert(1, create_v0_data_set(3, 0, 0, 0));

            let weight = InnerMigrateV0ToV1::<Test, NoViewContract>::on_runtime_upgrade();

            // One read, the rail index and the record itself
            assert_eq!(
                weight,
                <Test as frame_system::Config>::DbWeight::get().reads_writes(1, 2)
            );

            let info = crate::DataSets::<Test>::get(1).unwrap();
            assert_eq!(info.pdp_rail_id, 3);
            assert_eq!(info.cdn_rails, None);
            assert_eq!(info.payment_end_epoch, None);
            assert_eq!(crate::RailToDataSet::<Test>::get(3), Some(1));
        });
    }

    #[test]
    fn migration_keeps_cdn_rails_and_end_epoch() {
        ExtBuilder::build().execute_with(|| {
            v0::DataSets::<Test>::insert(7, create_v0_data_set(4, 5, 6, 900));

            InnerMigrateV0ToV1::<Test, NoViewContract>::on_runtime_upgrade();

            let info = crate::DataSets::<Test>::get(7).unwrap();
            assert_eq!(
                info.cdn_rails,
                Some(CdnRails {
                    cache_miss_rail_id: 5,
                    cdn_rail_id: 6
                })
            );
            assert_eq!(info.payment_end_epoch, Some(900));
            assert_eq!(info.payer, 10);
            assert_eq!(info.service_provider, 20);
            assert_eq!(info.payee, 21);
            assert_eq!(info.provider_id, 1);
            assert_eq!(info.client_data_set_id, 5);
            for rail_id in [4, 5, 6] {
                assert_eq!(crate::RailToDataSet::<Test>::get(rail_id), Some(7));
            }
        });
    }

    #[test]
    fn migration_drops_partial_cdn_rail_pair() {
        ExtBuilder::build().execute_with(|| {
            v0::DataSets::<Test>::insert(2, create_v0_data_set(8, 9, 0, 0));

            InnerMigrateV0ToV1::<Test, NoViewContract>::on_runtime_upgrade();

            let info = crate::DataSets::<Test>::get(2).unwrap();
            assert_eq!(info.cdn_rails, None);
            assert_eq!(crate::RailToDataSet::<Test>::get(9), None);
        });
    }

    #[test]
    fn migration_sets_view_contract_once() {
        ExtBuilder::build().execute_with(|| {
            InnerMigrateV0ToV1::<Test, SomeViewContract>::on_runtime_upgrade();
            assert_eq!(crate::ViewContract::<Test>::get(), Some(77));

            crate::ViewContract::<Test>::put(78);
            InnerMigrateV0ToV1::<Test, SomeViewContract>::on_runtime_upgrade();
            assert_eq!(crate::ViewContract::<Test>::get(), Some(78));
        });
    }

    #[test]
    fn versioned_migration_runs_only_once() {
        ExtBuilder::build().execute_with(|| {
            StorageVersion::new(0).put::<Pallet<Test>>();
            v0::DataSets::<Test>::insert(1, create_v0_data_set(3, 0, 0, 0));

            MigrateV0ToV1::<Test, SomeViewContract>::on_runtime_upgrade();

            assert_eq!(Pallet::<Test>::on_chain_storage_version(), 1);
            assert_eq!(crate::DataSets::<Test>::get(1).unwrap().pdp_rail_id, 3);
            assert_eq!(crate::ViewContract::<Test>::get(), Some(77));

            // A v0-encoded record written after the upgrade is left untouched by a second run
            crate::ViewContract::<Test>::kill();
            v0::DataSets::<Test>::insert(2, create_v0_data_set(11, 0, 0, 0));
            MigrateV0ToV1::<Test, SomeViewContract>::on_runtime_upgrade();

            assert_eq!(crate::RailToDataSet::<Test>::get(11), None);
            assert!(crate::ViewContract::<Test>::get().is_none());
        });
    }
}
