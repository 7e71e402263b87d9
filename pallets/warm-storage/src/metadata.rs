//! Bounded, write-once metadata of data sets and pieces.

use frame_support::{ensure, pallet_prelude::DispatchResult, traits::Get};
use scale_info::prelude::vec::Vec;

use crate::{
    pallet,
    types::{DataSetId, MetadataKey, MetadataScope, MetadataValue, PieceId},
    DataSetMetadata, DataSetMetadataKeys, Error, Pallet, PieceMetadata, PieceMetadataKeys,
};

impl<T> Pallet<T>
where
    T: pallet::Config,
{
    /// Validate and store a batch of metadata entries of a scope.
    ///
    /// Keys are write-once: a key already present in the scope, or repeated in the batch, is
    /// rejected. Nothing is written unless the whole batch is valid.
    pub(crate) fn set_metadata_entries(
        scope: MetadataScope,
        keys: Vec<Vec<u8>>,
        values: Vec<Vec<u8>>,
    ) -> DispatchResult {
        let max_keys = match scope {
            MetadataScope::DataSet(_) => T::MaxDataSetMetadataKeys::get(),
            MetadataScope::Piece(..) => T::MaxPieceMetadataKeys::get(),
        };
        let existing_keys = Self::metadata_keys_of(scope);
        let total_keys = existing_keys.len().saturating_add(keys.len());
        ensure!(
            total_keys <= max_keys as usize,
            Error::<T>::TooManyMetadataKeys {
                max_allowed: Self::saturated_u8(max_keys),
                keys_count: Self::saturated_u8(total_keys),
            }
        );

        Self::ensure_metadata_lists_match(&keys, &values)?;

        let mut batch: Vec<(MetadataKey<T>, MetadataValue<T>)> = Vec::with_capacity(keys.len());
        for (key, value) in keys.into_iter().zip(values) {
            let key_length = key.len();
            let key: MetadataKey<T> =
                key.try_into()
                    .map_err(|_| Error::<T>::MetadataKeyExceedsMaxLength {
                        max_allowed: Self::saturated_u8(T::MaxMetadataKeyLength::get()),
                        length: Self::saturated_u8(key_length),
                    })?;
            let value_length = value.len();
            let value: MetadataValue<T> =
                value
                    .try_into()
                    .map_err(|_| Error::<T>::MetadataValueExceedsMaxLength {
                        max_allowed: Self::saturated_u8(T::MaxMetadataValueLength::get()),
                        length: Self::saturated_u8(value_length),
                    })?;

            ensure!(
                !existing_keys.contains(&key) && !batch.iter().any(|(k, _)| *k == key),
                Error::<T>::DuplicateMetadataKey
            );
            batch.push((key, value));
        }

        let too_many_keys = || Error::<T>::TooManyMetadataKeys {
            max_allowed: Self::saturated_u8(max_keys),
            keys_count: Self::saturated_u8(total_keys),
        };
        match scope {
            MetadataScope::DataSet(data_set_id) => {
                DataSetMetadataKeys::<T>::try_mutate(data_set_id, |stored_keys| -> DispatchResult {
                    for (key, value) in batch {
                        stored_keys
                            .try_push(key.clone())
                            .map_err(|_| too_many_keys())?;
                        DataSetMetadata::<T>::insert(data_set_id, key, value);
                    }
                    Ok(())
                })
            }
            MetadataScope::Piece(data_set_id, piece_id) => {
                PieceMetadataKeys::<T>::try_mutate(data_set_id, piece_id, |stored_keys| -> DispatchResult {
                    for (key, value) in batch {
                        stored_keys
                            .try_push(key.clone())
                            .map_err(|_| too_many_keys())?;
                        PieceMetadata::<T>::insert((data_set_id, piece_id, key), value);
                    }
                    Ok(())
                })
            }
        }
    }

    fn metadata_keys_of(scope: MetadataScope) -> Vec<MetadataKey<T>> {
        match scope {
            MetadataScope::DataSet(data_set_id) => {
                DataSetMetadataKeys::<T>::get(data_set_id).into_inner()
            }
            MetadataScope::Piece(data_set_id, piece_id) => {
                PieceMetadataKeys::<T>::get(data_set_id, piece_id).into_inner()
            }
        }
    }

    fn metadata_value_of(scope: MetadataScope, key: &MetadataKey<T>) -> Option<MetadataValue<T>> {
        match scope {
            MetadataScope::DataSet(data_set_id) => DataSetMetadata::<T>::get(data_set_id, key),
            MetadataScope::Piece(data_set_id, piece_id) => {
                PieceMetadata::<T>::get((data_set_id, piece_id, key))
            }
        }
    }

    /// Look up a metadata entry of a scope. Returns whether the key exists and its value, empty
    /// if it does not.
    pub fn get_metadata(scope: MetadataScope, key: &[u8]) -> (bool, Vec<u8>) {
        let Ok(key) = MetadataKey::<T>::try_from(key.to_vec()) else {
            return (false, Vec::new());
        };
        match Self::metadata_value_of(scope, &key) {
            Some(value) => (true, value.into_inner()),
            None => (false, Vec::new()),
        }
    }

    /// All metadata entries of a scope, as parallel key and value lists in insertion order.
    pub fn get_all_metadata(scope: MetadataScope) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        Self::metadata_keys_of(scope)
            .into_iter()
            .map(|key| {
                let value = Self::metadata_value_of(scope, &key)
                    .map(|value| value.into_inner())
                    .unwrap_or_default();
                (key.into_inner(), value)
            })
            .unzip()
    }

    /// Look up a metadata entry of a data set.
    pub fn get_data_set_metadata(data_set_id: DataSetId, key: &[u8]) -> (bool, Vec<u8>) {
        Self::get_metadata(MetadataScope::DataSet(data_set_id), key)
    }

    /// All metadata entries of a data set.
    pub fn get_all_data_set_metadata(data_set_id: DataSetId) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        Self::get_all_metadata(MetadataScope::DataSet(data_set_id))
    }

    /// Look up a metadata entry of a piece.
    pub fn get_piece_metadata(
        data_set_id: DataSetId,
        piece_id: PieceId,
        key: &[u8],
    ) -> (bool, Vec<u8>) {
        Self::get_metadata(MetadataScope::Piece(data_set_id, piece_id), key)
    }

    /// All metadata entries of a piece.
    pub fn get_all_piece_metadata(
        data_set_id: DataSetId,
        piece_id: PieceId,
    ) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        Self::get_all_metadata(MetadataScope::Piece(data_set_id, piece_id))
    }
}
