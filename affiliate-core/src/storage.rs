//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `affiliates` - Affiliate records with balance snapshots (key: affiliate code)
//! - `earnings` - Append-mostly earning ledger (key: earning_id)
//! - `payouts` - Payout requests (key: payout_id)
//! - `links` - Master/sub hierarchy edges (key: sub affiliate code)
//! - `indices` - Secondary indices (idempotency, FIFO-pending, active payout, subs)
//!
//! Multi-record mutations commit through a single `WriteBatch` so a
//! failure partway through can never leave a half-applied state.

use crate::{
    error::{Error, Result},
    types::{Affiliate, AffiliateId, EarningRecord, EarningSource, MasterAffiliateLink, PayoutRequest},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_AFFILIATES: &str = "affiliates";
const CF_EARNINGS: &str = "earnings";
const CF_PAYOUTS: &str = "payouts";
const CF_LINKS: &str = "links";
const CF_INDICES: &str = "indices";

/// Index tags (first byte of every `indices` key)
const IDX_IDEMPOTENCY: u8 = b'i';
const IDX_FIFO_PENDING: u8 = b'f';
const IDX_ACTIVE_PAYOUT: u8 = b'a';
const IDX_SUBS: u8 = b's';

/// Key separator; affiliate codes must not contain NUL
const SEP: u8 = 0x00;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-mostly workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_AFFILIATES, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_EARNINGS, Self::cf_options_archival()),
            ColumnFamilyDescriptor::new(CF_PAYOUTS, Self::cf_options_archival()),
            ColumnFamilyDescriptor::new(CF_LINKS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB for affiliate core");

        Ok(Self { db: Arc::new(db) })
    }

    // Frequently-read CFs use LZ4 for speed; archival CFs use Zstd.

    fn cf_options_hot() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_archival() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Affiliate operations

    /// Put affiliate record
    pub fn put_affiliate(&self, affiliate: &Affiliate) -> Result<()> {
        let cf = self.cf_handle(CF_AFFILIATES)?;
        let value = bincode::serialize(affiliate)?;
        self.db.put_cf(cf, affiliate.id.as_str().as_bytes(), &value)?;
        Ok(())
    }

    /// Get affiliate by ID
    pub fn get_affiliate(&self, id: &AffiliateId) -> Result<Affiliate> {
        let cf = self.cf_handle(CF_AFFILIATES)?;
        let value = self
            .db
            .get_cf(cf, id.as_str().as_bytes())?
            .ok_or_else(|| Error::AffiliateNotFound(id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Check whether an affiliate exists
    pub fn affiliate_exists(&self, id: &AffiliateId) -> Result<bool> {
        let cf = self.cf_handle(CF_AFFILIATES)?;
        Ok(self.db.get_cf(cf, id.as_str().as_bytes())?.is_some())
    }

    /// Iterate all affiliates (snapshot read, used by the auto-payout sweep)
    pub fn list_affiliates(&self) -> Result<Vec<Affiliate>> {
        let cf = self.cf_handle(CF_AFFILIATES)?;
        let mut affiliates = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            affiliates.push(bincode::deserialize(&value)?);
        }
        Ok(affiliates)
    }

    // Earning operations

    /// Get earning record by ID
    pub fn get_earning(&self, id: Uuid) -> Result<EarningRecord> {
        let cf = self.cf_handle(CF_EARNINGS)?;
        let value = self
            .db
            .get_cf(cf, id.as_bytes())?
            .ok_or_else(|| Error::EarningNotFound(id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Look up an earning by idempotency key
    pub fn lookup_idempotency(
        &self,
        affiliate_id: &AffiliateId,
        source_type: EarningSource,
        source_event_id: &str,
    ) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::idx_idempotency(affiliate_id, source_type, source_event_id);
        match self.db.get_cf(cf, &key)? {
            Some(value) => {
                let bytes: [u8; 16] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt idempotency index value".to_string()))?;
                Ok(Some(Uuid::from_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Commit new earning records and updated affiliate snapshots atomically.
    ///
    /// Writes, per record: the record itself, its FIFO-pending index
    /// entry and (when a `source_event_id` is present) its idempotency
    /// index entry. One `WriteBatch` covers everything: the direct and
    /// override legs of a commission either both land or neither does.
    pub fn credit_atomic(
        &self,
        records: &[EarningRecord],
        affiliates: &[&Affiliate],
    ) -> Result<()> {
        let cf_earnings = self.cf_handle(CF_EARNINGS)?;
        let cf_affiliates = self.cf_handle(CF_AFFILIATES)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();

        for record in records {
            let value = bincode::serialize(record)?;
            batch.put_cf(cf_earnings, record.id.as_bytes(), &value);

            let fifo_key = Self::idx_fifo(&record.affiliate_id, record.earned_at, record.id);
            batch.put_cf(cf_indices, &fifo_key, []);

            if let Some(ref event_id) = record.source_event_id {
                let idem_key =
                    Self::idx_idempotency(&record.affiliate_id, record.source_type, event_id);
                batch.put_cf(cf_indices, &idem_key, record.id.as_bytes());
            }
        }

        for affiliate in affiliates {
            let value = bincode::serialize(affiliate)?;
            batch.put_cf(cf_affiliates, affiliate.id.as_str().as_bytes(), &value);
        }

        self.db.write(batch)?;
        Ok(())
    }

    /// Pending earnings for an affiliate, oldest first
    pub fn pending_earnings_fifo(&self, affiliate_id: &AffiliateId) -> Result<Vec<EarningRecord>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = Self::idx_fifo_prefix(affiliate_id);

        let iter = self.db.iterator_cf(
            cf_indices,
            IteratorMode::From(&prefix, Direction::Forward),
        );

        let mut records = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            // Last 16 bytes of the key are the earning ID
            if key.len() >= 16 {
                let id_bytes: [u8; 16] = key[key.len() - 16..]
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt FIFO index key".to_string()))?;
                records.push(self.get_earning(Uuid::from_bytes(id_bytes))?);
            }
        }

        Ok(records)
    }

    // Payout operations

    /// Get payout request by ID
    pub fn get_payout(&self, id: Uuid) -> Result<PayoutRequest> {
        let cf = self.cf_handle(CF_PAYOUTS)?;
        let value = self
            .db
            .get_cf(cf, id.as_bytes())?
            .ok_or_else(|| Error::PayoutNotFound(id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// The affiliate's current non-terminal payout, if any
    pub fn active_payout(&self, affiliate_id: &AffiliateId) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::idx_active_payout(affiliate_id);
        match self.db.get_cf(cf, &key)? {
            Some(value) => {
                let bytes: [u8; 16] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt active payout index".to_string()))?;
                Ok(Some(Uuid::from_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Write a new payout request and claim the affiliate's active slot
    pub fn open_payout_atomic(&self, payout: &PayoutRequest) -> Result<()> {
        let cf_payouts = self.cf_handle(CF_PAYOUTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();
        let value = bincode::serialize(payout)?;
        batch.put_cf(cf_payouts, payout.id.as_bytes(), &value);
        batch.put_cf(
            cf_indices,
            &Self::idx_active_payout(&payout.affiliate_id),
            payout.id.as_bytes(),
        );
        self.db.write(batch)?;
        Ok(())
    }

    /// Persist a payout transition that does not touch balances.
    ///
    /// Releases the active slot when the new state is terminal.
    pub fn put_payout_atomic(&self, payout: &PayoutRequest) -> Result<()> {
        let cf_payouts = self.cf_handle(CF_PAYOUTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();
        let value = bincode::serialize(payout)?;
        batch.put_cf(cf_payouts, payout.id.as_bytes(), &value);
        if payout.is_terminal() {
            batch.delete_cf(cf_indices, &Self::idx_active_payout(&payout.affiliate_id));
        }
        self.db.write(batch)?;
        Ok(())
    }

    /// Commit a payout completion: the finished request, the moved
    /// balance snapshot, and every earning flipped to `Paid` (with its
    /// FIFO-pending index entry removed), all in one batch.
    pub fn settle_payout_atomic(
        &self,
        payout: &PayoutRequest,
        affiliate: &Affiliate,
        paid_records: &[EarningRecord],
    ) -> Result<()> {
        let cf_payouts = self.cf_handle(CF_PAYOUTS)?;
        let cf_affiliates = self.cf_handle(CF_AFFILIATES)?;
        let cf_earnings = self.cf_handle(CF_EARNINGS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();

        let payout_value = bincode::serialize(payout)?;
        batch.put_cf(cf_payouts, payout.id.as_bytes(), &payout_value);
        batch.delete_cf(cf_indices, &Self::idx_active_payout(&payout.affiliate_id));

        let affiliate_value = bincode::serialize(affiliate)?;
        batch.put_cf(cf_affiliates, affiliate.id.as_str().as_bytes(), &affiliate_value);

        for record in paid_records {
            let value = bincode::serialize(record)?;
            batch.put_cf(cf_earnings, record.id.as_bytes(), &value);
            let fifo_key = Self::idx_fifo(&record.affiliate_id, record.earned_at, record.id);
            batch.delete_cf(cf_indices, &fifo_key);
        }

        self.db.write(batch)?;
        Ok(())
    }

    // Hierarchy link operations

    /// Get the link for a sub-affiliate
    pub fn get_link(&self, sub_id: &AffiliateId) -> Result<Option<MasterAffiliateLink>> {
        let cf = self.cf_handle(CF_LINKS)?;
        match self.db.get_cf(cf, sub_id.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Write a link and its master→sub reverse index atomically
    pub fn put_link_atomic(&self, link: &MasterAffiliateLink) -> Result<()> {
        let cf_links = self.cf_handle(CF_LINKS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();
        let value = bincode::serialize(link)?;
        batch.put_cf(cf_links, link.sub_id.as_str().as_bytes(), &value);
        batch.put_cf(cf_indices, &Self::idx_subs(&link.master_id, &link.sub_id), []);
        self.db.write(batch)?;
        Ok(())
    }

    /// Remove a link and its reverse index entry atomically
    pub fn delete_link_atomic(&self, link: &MasterAffiliateLink) -> Result<()> {
        let cf_links = self.cf_handle(CF_LINKS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(cf_links, link.sub_id.as_str().as_bytes());
        batch.delete_cf(cf_indices, &Self::idx_subs(&link.master_id, &link.sub_id));
        self.db.write(batch)?;
        Ok(())
    }

    /// Sub-affiliate IDs linked under a master
    pub fn subs_of(&self, master_id: &AffiliateId) -> Result<Vec<AffiliateId>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = Self::idx_subs_prefix(master_id);

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut subs = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let sub_bytes = &key[prefix.len()..];
            let sub = std::str::from_utf8(sub_bytes)
                .map_err(|_| Error::Storage("Corrupt subs index key".to_string()))?;
            subs.push(AffiliateId::new(sub));
        }

        Ok(subs)
    }

    /// Check whether an affiliate has any sub-affiliates
    pub fn has_subs(&self, master_id: &AffiliateId) -> Result<bool> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = Self::idx_subs_prefix(master_id);

        let mut iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        match iter.next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(key.starts_with(&prefix))
            }
            None => Ok(false),
        }
    }

    // Index key helpers

    fn idx_idempotency(
        affiliate_id: &AffiliateId,
        source_type: EarningSource,
        source_event_id: &str,
    ) -> Vec<u8> {
        let mut key = vec![IDX_IDEMPOTENCY];
        key.extend_from_slice(affiliate_id.as_str().as_bytes());
        key.push(SEP);
        key.push(source_type as u8);
        key.push(SEP);
        key.extend_from_slice(source_event_id.as_bytes());
        key
    }

    fn idx_fifo_prefix(affiliate_id: &AffiliateId) -> Vec<u8> {
        let mut key = vec![IDX_FIFO_PENDING];
        key.extend_from_slice(affiliate_id.as_str().as_bytes());
        key.push(SEP);
        key
    }

    fn idx_fifo(
        affiliate_id: &AffiliateId,
        earned_at: chrono::DateTime<chrono::Utc>,
        earning_id: Uuid,
    ) -> Vec<u8> {
        let mut key = Self::idx_fifo_prefix(affiliate_id);
        // Big-endian nanos keep lexicographic order == chronological order
        let nanos = earned_at.timestamp_nanos_opt().unwrap_or(0);
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(earning_id.as_bytes());
        key
    }

    fn idx_active_payout(affiliate_id: &AffiliateId) -> Vec<u8> {
        let mut key = vec![IDX_ACTIVE_PAYOUT];
        key.extend_from_slice(affiliate_id.as_str().as_bytes());
        key
    }

    fn idx_subs_prefix(master_id: &AffiliateId) -> Vec<u8> {
        let mut key = vec![IDX_SUBS];
        key.extend_from_slice(master_id.as_str().as_bytes());
        key.push(SEP);
        key
    }

    fn idx_subs(master_id: &AffiliateId, sub_id: &AffiliateId) -> Vec<u8> {
        let mut key = Self::idx_subs_prefix(master_id);
        key.extend_from_slice(sub_id.as_str().as_bytes());
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Currency, EarningSource, PaymentMethod, PayoutConfig, PayoutSchedule,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_affiliate(code: &str) -> Affiliate {
        Affiliate::register(
            AffiliateId::new(code),
            "Test",
            "test@example.com",
            PayoutConfig {
                payment_method: PaymentMethod::BankTransfer,
                minimum_payout: Decimal::new(20000, 2),
                payout_schedule: PayoutSchedule::Monthly,
                auto_payout: false,
            },
            Currency::USD,
        )
    }

    #[test]
    fn test_put_and_get_affiliate() {
        let (storage, _temp) = test_storage();
        let affiliate = test_affiliate("AFF100");

        storage.put_affiliate(&affiliate).unwrap();
        let retrieved = storage.get_affiliate(&affiliate.id).unwrap();
        assert_eq!(retrieved.id, affiliate.id);
        assert_eq!(retrieved.total_earnings, Decimal::ZERO);

        assert!(!storage
            .affiliate_exists(&AffiliateId::new("MISSING"))
            .unwrap());
    }

    #[test]
    fn test_credit_atomic_and_fifo_order() {
        let (storage, _temp) = test_storage();
        let mut affiliate = test_affiliate("AFF101");

        let mut records = Vec::new();
        for i in 1..=3i64 {
            let mut record = EarningRecord::new(
                affiliate.id.clone(),
                EarningSource::BetCommission,
                Decimal::new(i * 100, 2),
                None,
                Some(format!("evt-{}", i)),
            );
            // Force distinct ascending timestamps
            record.earned_at = Utc::now() + chrono::Duration::milliseconds(i);
            affiliate.credit(record.amount);
            records.push(record);
        }

        storage.credit_atomic(&records, &[&affiliate]).unwrap();

        let pending = storage.pending_earnings_fifo(&affiliate.id).unwrap();
        assert_eq!(pending.len(), 3);
        assert!(pending.windows(2).all(|w| w[0].earned_at <= w[1].earned_at));
        assert_eq!(pending[0].amount, Decimal::new(100, 2));
    }

    #[test]
    fn test_idempotency_index() {
        let (storage, _temp) = test_storage();
        let affiliate = test_affiliate("AFF102");

        let record = EarningRecord::new(
            affiliate.id.clone(),
            EarningSource::DepositCommission,
            Decimal::new(5000, 2),
            None,
            Some("deposit-42".to_string()),
        );
        storage.credit_atomic(&[record.clone()], &[&affiliate]).unwrap();

        let found = storage
            .lookup_idempotency(&affiliate.id, EarningSource::DepositCommission, "deposit-42")
            .unwrap();
        assert_eq!(found, Some(record.id));

        let missing = storage
            .lookup_idempotency(&affiliate.id, EarningSource::BetCommission, "deposit-42")
            .unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_active_payout_slot() {
        let (storage, _temp) = test_storage();
        let affiliate = test_affiliate("AFF103");
        storage.put_affiliate(&affiliate).unwrap();

        let mut payout =
            PayoutRequest::new(affiliate.id.clone(), Decimal::new(30000, 2), Currency::USD, 3);
        storage.open_payout_atomic(&payout).unwrap();

        assert_eq!(storage.active_payout(&affiliate.id).unwrap(), Some(payout.id));

        // Terminal transition releases the slot
        payout.status = crate::types::PayoutStatus::Cancelled;
        storage.put_payout_atomic(&payout).unwrap();
        assert_eq!(storage.active_payout(&affiliate.id).unwrap(), None);
    }

    #[test]
    fn test_link_roundtrip_and_subs_index() {
        let (storage, _temp) = test_storage();
        let master = AffiliateId::new("MASTER1");
        let sub = AffiliateId::new("SUB1");

        let link = MasterAffiliateLink {
            master_id: master.clone(),
            sub_id: sub.clone(),
            override_commission_rate: Decimal::new(10, 2),
            bet_rate: None,
            deposit_rate: None,
            linked_at: Utc::now(),
        };

        storage.put_link_atomic(&link).unwrap();
        assert!(storage.get_link(&sub).unwrap().is_some());
        assert!(storage.has_subs(&master).unwrap());
        assert_eq!(storage.subs_of(&master).unwrap(), vec![sub.clone()]);

        storage.delete_link_atomic(&link).unwrap();
        assert!(storage.get_link(&sub).unwrap().is_none());
        assert!(!storage.has_subs(&master).unwrap());
    }
}
