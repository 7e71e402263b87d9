use crate as pallet_warm_storage;
use crate::types::{
    AuthorizedOperation, ClientDataSetId, DataSetCreatePayload, DataSetId, MetadataPairs,
    PieceCid, PieceId, PiecesAddedPayload, PiecesRemovePayload,
};
use codec::Encode;
use frame_support::{
    derive_impl, parameter_types,
    traits::{
        fungible::{Inspect, Mutate},
        tokens::Preservation,
        Everything,
    },
    weights::constants::RocksDbWeight,
    Blake2_128Concat, PalletId,
};
use frame_system::EnsureRoot;
use sp_core::{ecdsa, ConstU128, ConstU16, ConstU32, ConstU64, Pair, H160};
use sp_io::hashing::keccak_256;
use sp_runtime::{
    traits::{Convert, IdentityLookup},
    BuildStorage, DispatchError, DispatchResult,
};
use std::{cell::RefCell, collections::BTreeMap};
use wsp_traits::{
    PaymentRailsInterface, PieceSizeResolver, ProviderInfo, RailView,
    ServiceProviderRegistryInterface,
};

type Block = frame_system::mocking::MockBlock<Test>;
pub type Balance = u128;
pub type AccountId = u64;
pub type BlockNumber = u64;

pub const UNITS: Balance = 1_000_000;

pub const PDP_VERIFIER: AccountId = 100;
pub const CDN_BENEFICIARY: AccountId = 200;

/// Registered and approved in genesis, Provider ID 1.
pub const PROVIDER_ALICE: AccountId = 1;
pub const PROVIDER_ALICE_PAYEE: AccountId = 11;
/// Registered and approved in genesis, Provider ID 2.
pub const PROVIDER_BOB: AccountId = 2;
pub const PROVIDER_BOB_PAYEE: AccountId = 12;
/// Registered but not approved, Provider ID 3.
pub const PROVIDER_CHARLIE: AccountId = 3;
pub const PROVIDER_CHARLIE_PAYEE: AccountId = 13;

pub const MAX_PROVING_PERIOD: BlockNumber = 100;
pub const CHALLENGE_WINDOW: BlockNumber = 20;
pub const LOCKUP_PERIOD: BlockNumber = 50;
pub const CREATION_FEE: Balance = 100;
pub const EPOCHS_PER_MONTH: u32 = wsp_constants::EPOCHS_PER_MONTH;
/// Storage price giving a rate of 5 per epoch per TiB.
pub const STORAGE_PRICE: Balance = 5 * EPOCHS_PER_MONTH as Balance;
/// Cache-miss price giving a rate of 1 per epoch per TiB.
pub const CACHE_MISS_PRICE: Balance = EPOCHS_PER_MONTH as Balance;
/// CDN price giving a rate of 2 per epoch per TiB.
pub const CDN_PRICE: Balance = 2 * EPOCHS_PER_MONTH as Balance;

// Configure a mock runtime to test the pallet.
#[frame_support::runtime]
mod test_runtime {
    #[runtime::runtime]
    #[runtime::derive(
        RuntimeCall,
        RuntimeEvent,
        RuntimeError,
        RuntimeOrigin,
        RuntimeFreezeReason,
        RuntimeHoldReason,
        RuntimeSlashReason,
        RuntimeLockId,
        RuntimeTask
    )]
    pub struct Test;

    #[runtime::pallet_index(0)]
    pub type System = frame_system;
    #[runtime::pallet_index(1)]
    pub type Balances = pallet_balances;
    #[runtime::pallet_index(2)]
    pub type WarmStorage = crate;
}

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Test {
    type BaseCallFilter = Everything;
    type DbWeight = RocksDbWeight;
    type AccountId = AccountId;
    type Lookup = IdentityLookup<Self::AccountId>;
    type Block = Block;
    type AccountData = pallet_balances::AccountData<Balance>;
}

#[derive_impl(pallet_balances::config_preludes::TestDefaultConfig)]
impl pallet_balances::Config for Test {
    type Balance = Balance;
    type ExistentialDeposit = ConstU128<1>;
    type AccountStore = System;
}

parameter_types! {
    pub const PdpVerifierAccount: AccountId = PDP_VERIFIER;
    pub const CdnBeneficiary: AccountId = CDN_BENEFICIARY;
    pub const WarmStoragePalletId: PalletId = PalletId(*b"wrmstrge");
    pub const DataSetCreationFee: Balance = CREATION_FEE;
    pub const StoragePricePerTibPerMonth: Balance = STORAGE_PRICE;
    pub const CacheMissPricePerTibPerMonth: Balance = CACHE_MISS_PRICE;
    pub const CdnPricePerTibPerMonth: Balance = CDN_PRICE;
}

impl crate::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type Registry = MockRegistry;
    type PaymentRails = MockPaymentRails;
    type PieceSizes = MockPieceSizes;
    type SignerToAccountId = AddressToAccountId;
    type ServiceOwnerOrigin = EnsureRoot<AccountId>;
    type PdpVerifierAccount = PdpVerifierAccount;
    type PalletId = WarmStoragePalletId;
    type CdnBeneficiary = CdnBeneficiary;
    type MaxMetadataKeyLength = ConstU32<{ wsp_constants::MAX_METADATA_KEY_LENGTH }>;
    type MaxMetadataValueLength = ConstU32<{ wsp_constants::MAX_METADATA_VALUE_LENGTH }>;
    type MaxDataSetMetadataKeys = ConstU32<{ wsp_constants::MAX_KEYS_PER_DATA_SET }>;
    type MaxPieceMetadataKeys = ConstU32<{ wsp_constants::MAX_KEYS_PER_PIECE }>;
    type MaxApprovedProviders = ConstU32<4>;
    type MaxPieceCidLength = ConstU32<64>;
    type ChallengesPerProof = ConstU32<{ wsp_constants::CHALLENGES_PER_PROOF }>;
    type DataSetCreationFee = DataSetCreationFee;
    type StoragePricePerTibPerMonth = StoragePricePerTibPerMonth;
    type CacheMissPricePerTibPerMonth = CacheMissPricePerTibPerMonth;
    type CdnPricePerTibPerMonth = CdnPricePerTibPerMonth;
    type ServiceCommissionBps = ConstU16<100>;
    type DefaultLockupPeriod = ConstU64<LOCKUP_PERIOD>;
    type EpochsPerMonth = ConstU32<EPOCHS_PER_MONTH>;
    #[cfg(feature = "runtime-benchmarks")]
    type BenchmarkHelpers = MockBenchmarkHelpers;
}

/// Maps a recovered address to the account made of its last 8 bytes.
pub struct AddressToAccountId;
impl Convert<H160, AccountId> for AddressToAccountId {
    fn convert(address: H160) -> AccountId {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&address.as_bytes()[12..]);
        AccountId::from_be_bytes(bytes)
    }
}

// Service-provider registry mock:

thread_local! {
    static PROVIDERS: RefCell<BTreeMap<u64, ProviderInfo<AccountId>>> = RefCell::new(BTreeMap::new());
}

pub struct MockRegistry;
impl MockRegistry {
    pub fn register(provider_id: u64, service_provider: AccountId, payee: AccountId) {
        PROVIDERS.with(|providers| {
            providers.borrow_mut().insert(
                provider_id,
                ProviderInfo {
                    service_provider,
                    payee,
                    is_active: true,
                },
            )
        });
    }
}

impl ServiceProviderRegistryInterface for MockRegistry {
    type AccountId = AccountId;
    type ProviderId = u64;

    fn get_provider(provider_id: &u64) -> Option<ProviderInfo<AccountId>> {
        PROVIDERS.with(|providers| providers.borrow().get(provider_id).cloned())
    }

    fn is_registered_provider(who: &AccountId) -> bool {
        Self::get_provider_id_by_address(who).is_some()
    }

    fn get_provider_id_by_address(who: &AccountId) -> Option<u64> {
        PROVIDERS.with(|providers| {
            providers
                .borrow()
                .iter()
                .find(|(_, info)| info.service_provider == *who && info.is_active)
                .map(|(provider_id, _)| *provider_id)
        })
    }
}

// Payments ledger mock, kept in storage so failed calls roll it back:

pub type MockRail = RailView<AccountId, Balance, BlockNumber>;

#[frame_support::storage_alias(verbatim)]
pub type MockRails = StorageMap<MockLedger, Blake2_128Concat, u64, MockRail>;

#[frame_support::storage_alias(verbatim)]
pub type MockNextRailId = StorageValue<MockLedger, u64, frame_support::pallet_prelude::ValueQuery>;

#[frame_support::storage_alias(verbatim)]
pub type MockOperatorApprovals =
    StorageDoubleMap<MockLedger, Blake2_128Concat, AccountId, Blake2_128Concat, AccountId, ()>;

pub struct MockPaymentRails;
impl MockPaymentRails {
    pub fn approve_operator(payer: AccountId, operator: AccountId) {
        MockOperatorApprovals::insert(payer, operator, ());
    }

    pub fn rail(rail_id: u64) -> MockRail {
        MockRails::get(rail_id).expect("rail should exist")
    }

    /// Settle a rail, asking the service to validate the payment when it is the rail's validator.
    pub fn settle(
        rail_id: u64,
        from_epoch: BlockNumber,
        to_epoch: BlockNumber,
    ) -> Result<(Balance, BlockNumber), DispatchError> {
        use wsp_traits::RailValidator;

        let rail = Self::rail(rail_id);
        let proposed_amount = rail.payment_rate * (to_epoch - from_epoch) as Balance;
        if rail.validator.is_none() {
            return Ok((proposed_amount, to_epoch));
        }
        let validation = <WarmStorage as RailValidator>::validate_payment(
            &rail_id,
            proposed_amount,
            from_epoch,
            to_epoch,
        )?;
        Ok((validation.modified_amount, validation.settle_upto))
    }
}

impl PaymentRailsInterface for MockPaymentRails {
    type AccountId = AccountId;
    type Balance = Balance;
    type BlockNumber = BlockNumber;
    type RailId = u64;

    fn create_rail(
        payer: &AccountId,
        payee: &AccountId,
        operator: &AccountId,
        validator: Option<&AccountId>,
        commission_rate_bps: u16,
    ) -> Result<u64, DispatchError> {
        if !MockOperatorApprovals::contains_key(payer, operator) {
            return Err(DispatchError::Other("OperatorNotApproved"));
        }
        let rail_id = MockNextRailId::mutate(|next| {
            *next += 1;
            *next
        });
        MockRails::insert(
            rail_id,
            RailView {
                payer: *payer,
                payee: *payee,
                operator: *operator,
                validator: validator.copied(),
                commission_rate_bps,
                payment_rate: 0,
                lockup_period: 0,
                lockup_fixed: 0,
                end_epoch: None,
            },
        );
        Ok(rail_id)
    }

    fn modify_rail_lockup(
        rail_id: &u64,
        lockup_period: BlockNumber,
        lockup_fixed: Balance,
    ) -> DispatchResult {
        MockRails::try_mutate(rail_id, |maybe_rail| -> DispatchResult {
            let rail = maybe_rail.as_mut().ok_or(DispatchError::Other("RailNotFound"))?;
            rail.lockup_period = lockup_period;
            rail.lockup_fixed = lockup_fixed;
            Ok(())
        })
    }

    fn modify_rail_payment(
        rail_id: &u64,
        new_rate: Balance,
        one_time_payment: Balance,
    ) -> DispatchResult {
        MockRails::try_mutate(rail_id, |maybe_rail| -> DispatchResult {
            let rail = maybe_rail.as_mut().ok_or(DispatchError::Other("RailNotFound"))?;
            if one_time_payment > 0 {
                if one_time_payment > rail.lockup_fixed {
                    return Err(DispatchError::Other("OneTimePaymentExceedsLockup"));
                }
                rail.lockup_fixed -= one_time_payment;
                <Balances as Mutate<AccountId>>::transfer(
                    &rail.payer,
                    &rail.payee,
                    one_time_payment,
                    Preservation::Expendable,
                )?;
            }
            rail.payment_rate = new_rate;
            Ok(())
        })
    }

    fn terminate_rail(rail_id: &u64) -> Result<BlockNumber, DispatchError> {
        MockRails::try_mutate(rail_id, |maybe_rail| -> Result<BlockNumber, DispatchError> {
            let rail = maybe_rail.as_mut().ok_or(DispatchError::Other("RailNotFound"))?;
            if rail.end_epoch.is_some() {
                return Err(DispatchError::Other("RailAlreadyTerminated"));
            }
            let end_epoch = System::block_number() + rail.lockup_period;
            rail.end_epoch = Some(end_epoch);
            Ok(end_epoch)
        })
    }

    fn get_rail(rail_id: &u64) -> Option<MockRail> {
        MockRails::get(rail_id)
    }
}

/// Resolves the size of test CIDs, which are a tag byte followed by the size as little-endian bytes.
pub struct MockPieceSizes;
impl PieceSizeResolver for MockPieceSizes {
    fn piece_size(piece_cid: &[u8]) -> Option<u64> {
        let size_bytes: [u8; 8] = piece_cid.get(1..9)?.try_into().ok()?;
        Some(u64::from_le_bytes(size_bytes))
    }
}

pub fn piece_cid(tag: u8, size: u64) -> PieceCid<Test> {
    let mut cid = vec![tag];
    cid.extend_from_slice(&size.to_le_bytes());
    cid.try_into().expect("test CIDs fit the bound")
}

// Signing helpers:

/// A client able to sign authorizations, identified by the account its address maps to.
pub struct Client {
    pub pair: ecdsa::Pair,
    pub account: AccountId,
}

impl Client {
    pub fn from_seed(seed: u8) -> Self {
        let pair = ecdsa::Pair::from_seed(&[seed; 32]);
        let message = [7u8; 32];
        let signature = sign_prehashed(&pair, &message);
        let public_key = sp_io::crypto::secp256k1_ecdsa_recover(&signature, &message)
            .expect("freshly made signatures recover");
        let address = H160::from_slice(&keccak_256(&public_key)[12..]);
        Self {
            pair,
            account: AddressToAccountId::convert(address),
        }
    }

    pub fn sign(&self, operation: &AuthorizedOperation<AccountId>) -> Vec<u8> {
        let digest = WarmStorage::authorization_digest(operation);
        sign_prehashed(&self.pair, &digest).to_vec()
    }
}

/// Sign a digest, with the recovery byte in its 27/28 form.
pub fn sign_prehashed(pair: &ecdsa::Pair, digest: &[u8; 32]) -> [u8; 65] {
    let signature = pair.sign_prehashed(digest);
    let mut bytes = [0u8; 65];
    bytes.copy_from_slice(signature.as_ref());
    bytes[64] += 27;
    bytes
}

// Benchmark helpers, registering Providers from ID 10 and payers signing with seeds from 50:

#[cfg(feature = "runtime-benchmarks")]
thread_local! {
    static BENCHMARK_PAYERS: RefCell<BTreeMap<AccountId, u8>> = RefCell::new(BTreeMap::new());
}

#[cfg(feature = "runtime-benchmarks")]
pub struct MockBenchmarkHelpers;
#[cfg(feature = "runtime-benchmarks")]
impl crate::benchmarking::BenchmarkHelpers<Test> for MockBenchmarkHelpers {
    fn register_provider(index: u32) -> (u64, AccountId, AccountId) {
        let provider_id = 10 + index as u64;
        let service_provider = 1_000 + index as AccountId;
        let payee = 2_000 + index as AccountId;
        MockRegistry::register(provider_id, service_provider, payee);
        (provider_id, service_provider, payee)
    }

    fn setup_payer(index: u32, operator: &AccountId) -> AccountId {
        let seed = 50 + index as u8;
        let client = Client::from_seed(seed);
        <Balances as Mutate<AccountId>>::mint_into(&client.account, 1_000 * UNITS)
            .expect("minting to a fresh account works");
        MockPaymentRails::approve_operator(client.account, *operator);
        BENCHMARK_PAYERS.with(|payers| payers.borrow_mut().insert(client.account, seed));
        client.account
    }

    fn sign(payer: &AccountId, digest: &[u8; 32]) -> Vec<u8> {
        BENCHMARK_PAYERS
            .with(|payers| payers.borrow().get(payer).copied())
            .map(|seed| sign_prehashed(&Client::from_seed(seed).pair, digest).to_vec())
            .unwrap_or_default()
    }

    fn piece_cid(index: u32, size: u64) -> Vec<u8> {
        piece_cid(index as u8, size).to_vec()
    }
}

pub fn alice_client() -> Client {
    Client::from_seed(1)
}

pub fn bob_client() -> Client {
    Client::from_seed(2)
}

pub fn metadata(entries: &[(&str, &str)]) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
    entries
        .iter()
        .map(|(key, value)| (key.as_bytes().to_vec(), value.as_bytes().to_vec()))
        .unzip()
}

fn pairs(keys: &[Vec<u8>], values: &[Vec<u8>]) -> MetadataPairs {
    keys.iter().cloned().zip(values.iter().cloned()).collect()
}

pub fn create_payload(
    client: &Client,
    client_data_set_id: ClientDataSetId,
    payee: AccountId,
    keys: Vec<Vec<u8>>,
    values: Vec<Vec<u8>>,
) -> Vec<u8> {
    let signature = client.sign(&AuthorizedOperation::CreateDataSet {
        client_data_set_id,
        payee,
        metadata: pairs(&keys, &values),
    });
    DataSetCreatePayload {
        payer: client.account,
        client_data_set_id,
        metadata_keys: keys,
        metadata_values: values,
        signature,
    }
    .encode()
}

pub fn add_pieces_payload(
    client: &Client,
    client_data_set_id: ClientDataSetId,
    first_added: PieceId,
    piece_cids: &[PieceCid<Test>],
    keys: Vec<Vec<Vec<u8>>>,
    values: Vec<Vec<Vec<u8>>>,
) -> Vec<u8> {
    let signature = client.sign(&AuthorizedOperation::AddPieces {
        client_data_set_id,
        first_added,
        piece_cids: piece_cids.iter().map(|cid| cid.to_vec()).collect(),
        metadata: keys
            .iter()
            .zip(values.iter())
            .map(|(keys, values)| pairs(keys, values))
            .collect(),
    });
    PiecesAddedPayload {
        signature,
        metadata_keys: keys,
        metadata_values: values,
    }
    .encode()
}

pub fn remove_pieces_payload(
    client: &Client,
    client_data_set_id: ClientDataSetId,
    piece_ids: &[PieceId],
) -> Vec<u8> {
    let signature = client.sign(&AuthorizedOperation::SchedulePieceRemovals {
        client_data_set_id,
        piece_ids: piece_ids.to_vec(),
    });
    PiecesRemovePayload { signature }.encode()
}

/// Create a data set through the verifier callback.
pub fn create_data_set(
    data_set_id: DataSetId,
    client: &Client,
    client_data_set_id: ClientDataSetId,
    service_provider: AccountId,
    payee: AccountId,
    entries: &[(&str, &str)],
) -> DispatchResult {
    let (keys, values) = metadata(entries);
    WarmStorage::data_set_created(
        RuntimeOrigin::signed(PDP_VERIFIER),
        data_set_id,
        service_provider,
        create_payload(client, client_data_set_id, payee, keys, values),
    )
    .map(|_| ())
    .map_err(|error| error.error)
}

/// Add pieces without metadata through the verifier callback.
pub fn add_pieces(
    data_set_id: DataSetId,
    client: &Client,
    client_data_set_id: ClientDataSetId,
    first_added: PieceId,
    piece_cids: Vec<PieceCid<Test>>,
) -> DispatchResult {
    let empty = vec![Vec::new(); piece_cids.len()];
    let payload = add_pieces_payload(
        client,
        client_data_set_id,
        first_added,
        &piece_cids,
        empty.clone(),
        empty,
    );
    WarmStorage::pieces_added(
        RuntimeOrigin::signed(PDP_VERIFIER),
        data_set_id,
        first_added,
        piece_cids,
        payload,
    )
    .map(|_| ())
    .map_err(|error| error.error)
}

pub fn run_to_block(n: BlockNumber) {
    System::set_block_number(n);
}

pub fn balance_of(who: AccountId) -> Balance {
    <Balances as Inspect<AccountId>>::balance(&who)
}

// Externalities builder with the genesis Providers approved, the proving period configured and
// funded clients that approved the service as operator, starting at block number 1
pub struct ExtBuilder;
impl ExtBuilder {
    pub fn build() -> sp_io::TestExternalities {
        let mut t = frame_system::GenesisConfig::<Test>::default()
            .build_storage()
            .unwrap();

        pallet_warm_storage::GenesisConfig::<Test> {
            max_proving_period: MAX_PROVING_PERIOD,
            challenge_window_size: CHALLENGE_WINDOW,
            approved_providers: vec![1, 2],
        }
        .assimilate_storage(&mut t)
        .unwrap();

        MockRegistry::register(1, PROVIDER_ALICE, PROVIDER_ALICE_PAYEE);
        MockRegistry::register(2, PROVIDER_BOB, PROVIDER_BOB_PAYEE);
        MockRegistry::register(3, PROVIDER_CHARLIE, PROVIDER_CHARLIE_PAYEE);

        let mut ext = sp_io::TestExternalities::new(t);
        ext.execute_with(|| {
            System::set_block_number(1);

            let service = WarmStorage::service_account();
            for client in [alice_client(), bob_client()] {
                <Balances as Mutate<AccountId>>::mint_into(&client.account, 1_000 * UNITS)
                    .unwrap();
                MockPaymentRails::approve_operator(client.account, service);
            }
        });
        ext
    }
}
