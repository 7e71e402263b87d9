//! Authorization of data set operations by the payer's secp256k1 signature.
//!
//! The signed digest is `keccak256(0x19 ‖ 0x01 ‖ domain_separator ‖ keccak256(operation))`, where
//! `operation` is the SCALE encoding of an [`AuthorizedOperation`] and the domain separator binds
//! the signature to this service's account.

use codec::Encode;
use frame_support::pallet_prelude::DispatchResult;
use scale_info::prelude::vec::Vec;
use sp_core::H160;
use sp_io::{crypto::secp256k1_ecdsa_recover, hashing::keccak_256};
use sp_runtime::traits::Convert;
use wsp_constants::{SIGNING_DOMAIN_NAME, SIGNING_DOMAIN_VERSION};

use crate::{pallet, types::AuthorizedOperation, Error, Pallet, LOG_TARGET};

/// Length of a signature: `r ‖ s ‖ v`.
pub const SIGNATURE_LENGTH: usize = 65;

impl<T> Pallet<T>
where
    T: pallet::Config,
{
    /// Hash binding signatures to this service.
    pub fn domain_separator() -> [u8; 32] {
        keccak_256(&(SIGNING_DOMAIN_NAME, SIGNING_DOMAIN_VERSION, Self::service_account()).encode())
    }

    /// The digest a payer signs to authorize `operation`.
    pub fn authorization_digest(operation: &AuthorizedOperation<T::AccountId>) -> [u8; 32] {
        let operation_hash = keccak_256(&operation.encode());

        let mut preimage = Vec::with_capacity(2 + 32 + 32);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(&Self::domain_separator());
        preimage.extend_from_slice(&operation_hash);

        keccak_256(&preimage)
    }

    /// Recover the address that signed `message_hash`.
    ///
    /// Recovery bytes 0 and 1 are accepted as 27 and 28. A well-formed signature that does not
    /// recover to any key yields the zero address.
    pub fn recover_signer(message_hash: &[u8; 32], signature: &[u8]) -> Result<H160, Error<T>> {
        let mut signature: [u8; SIGNATURE_LENGTH] = signature
            .try_into()
            .map_err(|_| Error::<T>::InvalidSignatureLength)?;

        let mut v = signature[64];
        if v < 27 {
            v = v.saturating_add(27);
        }
        if v != 27 && v != 28 {
            return Err(Error::<T>::UnsupportedSignatureV { v });
        }
        signature[64] = v;

        Ok(match secp256k1_ecdsa_recover(&signature, message_hash) {
            Ok(public_key) => H160::from_slice(&keccak_256(&public_key)[12..]),
            Err(_) => H160::zero(),
        })
    }

    /// Check that `signature` authorizes `operation` on behalf of `payer`.
    pub(crate) fn verify_authorization(
        operation: &AuthorizedOperation<T::AccountId>,
        signature: &[u8],
        payer: &T::AccountId,
    ) -> DispatchResult {
        let digest = Self::authorization_digest(operation);
        let signer = Self::recover_signer(&digest, signature)?;

        if signer.is_zero() || T::SignerToAccountId::convert(signer) != *payer {
            log::debug!(
                target: LOG_TARGET,
                "Signature of {:?} does not authorize operation for payer {:?}",
                signer,
                payer
            );
            return Err(Error::<T>::InvalidSignature.into());
        }

        Ok(())
    }
}
