use super::database::Database;
use super::models::{Approval, ApprovalUpdate, NewApproval, TokenType};
use super::store::ApprovalStore;
use crate::chains::Chain;
use crate::error::StoreError;
use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, ToSql, params, params_from_iter};
use std::str::FromStr;

pub struct ApprovalRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> ApprovalRepository<'a> {
    const INSERT_APPROVAL: &'static str = "INSERT INTO approvals (
            user_id, wallet_address, contract_address, token_name, token_symbol,
            token_type, spender_address, approved_amount, chain, is_unlimited,
            is_revoked, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?11)";

    const SELECT_APPROVAL: &'static str = "SELECT id, user_id, wallet_address, contract_address,
            token_name, token_symbol, token_type, spender_address, approved_amount, chain,
            is_unlimited, is_revoked, created_at, updated_at FROM approvals";

    const UPDATE_APPROVAL: &'static str = "UPDATE approvals SET
            token_name = COALESCE(?1, token_name),
            token_symbol = COALESCE(?2, token_symbol),
            token_type = COALESCE(?3, token_type),
            spender_address = COALESCE(?4, spender_address),
            approved_amount = COALESCE(?5, approved_amount),
            is_unlimited = COALESCE(?6, is_unlimited),
            updated_at = MAX(?7, created_at)
        WHERE id = ?8";

    const REVOKE_APPROVAL: &'static str =
        "UPDATE approvals SET is_revoked = 1, updated_at = MAX(?1, created_at) WHERE id = ?2";

    const DELETE_APPROVAL: &'static str = "DELETE FROM approvals WHERE id = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, approval: &NewApproval) -> Result<Approval, StoreError> {
        let now = now_millis();
        self.conn.execute(
            Self::INSERT_APPROVAL,
            params![
                approval.user_id,
                format!("{:?}", approval.wallet_address),
                format!("{:?}", approval.contract_address),
                approval.token_name,
                approval.token_symbol,
                approval.token_type.as_str(),
                format!("{:?}", approval.spender_address),
                approval.approved_amount,
                approval.chain.as_str(),
                approval.is_unlimited,
                now,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get(id)?.ok_or_else(|| StoreError::Corrupt {
            id,
            reason: "inserted row not found".to_string(),
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<Approval>, StoreError> {
        let query = format!("{} WHERE id = ?1", Self::SELECT_APPROVAL);
        let approval = self
            .conn
            .query_row(&query, params![id], Self::row_to_approval)
            .optional()?;
        Ok(approval)
    }

    pub fn list(&self, user_id: Option<i64>) -> Result<Vec<Approval>, StoreError> {
        match user_id {
            Some(user_id) => self.select_where(vec!["user_id = ?"], vec![Box::new(user_id)]),
            None => self.select_where(Vec::new(), Vec::new()),
        }
    }

    pub fn list_by_chain(&self, chain: Chain) -> Result<Vec<Approval>, StoreError> {
        self.select_where(vec!["chain = ?"], vec![Box::new(chain.as_str())])
    }

    pub fn list_by_wallet(&self, wallet: &Address, chain: Chain) -> Result<Vec<Approval>, StoreError> {
        self.select_where(
            vec!["wallet_address = ?", "chain = ?"],
            vec![Box::new(format!("{wallet:?}")), Box::new(chain.as_str())],
        )
    }

    pub fn find_by_contract(
        &self,
        wallet: &Address,
        chain: Chain,
        contract: &Address,
    ) -> Result<Option<Approval>, StoreError> {
        let mut found = self.select_where(
            vec!["wallet_address = ?", "chain = ?", "contract_address = ?"],
            vec![
                Box::new(format!("{wallet:?}")),
                Box::new(chain.as_str()),
                Box::new(format!("{contract:?}")),
            ],
        )?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    pub fn update(&self, id: i64, update: &ApprovalUpdate) -> Result<Option<Approval>, StoreError> {
        let changed = self.conn.execute(
            Self::UPDATE_APPROVAL,
            params![
                update.token_name,
                update.token_symbol,
                update.token_type.map(|t| t.as_str()),
                update.spender_address.map(|a| format!("{a:?}")),
                update.approved_amount,
                update.is_unlimited,
                now_millis(),
                id,
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    pub fn revoke(&self, id: i64) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute(Self::REVOKE_APPROVAL, params![now_millis(), id])?;
        Ok(changed > 0)
    }

    pub fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let changed = self.conn.execute(Self::DELETE_APPROVAL, params![id])?;
        Ok(changed > 0)
    }

    fn select_where(
        &self,
        conditions: Vec<&str>,
        params: Vec<Box<dyn ToSql>>,
    ) -> Result<Vec<Approval>, StoreError> {
        let mut query = Self::SELECT_APPROVAL.to_string();

        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&query)?;
        let approvals = stmt
            .query_map(params_from_iter(params), Self::row_to_approval)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(approvals)
    }

    fn row_to_approval(row: &Row) -> rusqlite::Result<Approval> {
        let address = |idx: usize| -> rusqlite::Result<Address> {
            Address::from_str(&row.get::<_, String>(idx)?).map_err(|e| conversion_error(idx, e))
        };
        let timestamp = |idx: usize| -> rusqlite::Result<DateTime<Utc>> {
            let millis: i64 = row.get(idx)?;
            DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| conversion_error(idx, format!("timestamp out of range: {millis}")))
        };

        let token_type =
            TokenType::from_str(&row.get::<_, String>(6)?).map_err(|e| conversion_error(6, e))?;
        let chain = Chain::from_str(&row.get::<_, String>(9)?).map_err(|e| conversion_error(9, e))?;

        Ok(Approval {
            id: row.get(0)?,
            user_id: row.get(1)?,
            wallet_address: address(2)?,
            contract_address: address(3)?,
            token_name: row.get(4)?,
            token_symbol: row.get(5)?,
            token_type,
            spender_address: address(7)?,
            approved_amount: row.get(8)?,
            chain,
            is_unlimited: row.get(10)?,
            is_revoked: row.get(11)?,
            created_at: timestamp(12)?,
            updated_at: timestamp(13)?,
        })
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn conversion_error(idx: usize, err: impl ToString) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.to_string().into())
}

/// [`ApprovalStore`] backed by SQLite. Queries run on the blocking pool.
#[derive(Clone)]
pub struct SqliteApprovalStore {
    db: Database,
}

impl SqliteApprovalStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&ApprovalRepository) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock()?;
            let repo = ApprovalRepository::new(&conn);
            f(&repo)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl ApprovalStore for SqliteApprovalStore {
    async fn get(&self, id: i64) -> Result<Option<Approval>, StoreError> {
        self.run(move |repo| repo.get(id)).await
    }

    async fn list(&self, user_id: Option<i64>) -> Result<Vec<Approval>, StoreError> {
        self.run(move |repo| repo.list(user_id)).await
    }

    async fn list_by_chain(&self, chain: Chain) -> Result<Vec<Approval>, StoreError> {
        self.run(move |repo| repo.list_by_chain(chain)).await
    }

    async fn list_by_wallet(
        &self,
        wallet: Address,
        chain: Chain,
    ) -> Result<Vec<Approval>, StoreError> {
        self.run(move |repo| repo.list_by_wallet(&wallet, chain)).await
    }

    async fn find_by_contract(
        &self,
        wallet: Address,
        chain: Chain,
        contract: Address,
    ) -> Result<Option<Approval>, StoreError> {
        self.run(move |repo| repo.find_by_contract(&wallet, chain, &contract))
            .await
    }

    async fn create(&self, approval: NewApproval) -> Result<Approval, StoreError> {
        self.run(move |repo| repo.insert(&approval)).await
    }

    async fn update(
        &self,
        id: i64,
        update: ApprovalUpdate,
    ) -> Result<Option<Approval>, StoreError> {
        self.run(move |repo| repo.update(id, &update)).await
    }

    async fn revoke(&self, id: i64) -> Result<bool, StoreError> {
        self.run(move |repo| repo.revoke(id)).await
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.run(move |repo| repo.delete(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_approval(contract: u8, user_id: Option<i64>) -> NewApproval {
        NewApproval {
            user_id,
            wallet_address: Address::repeat_byte(0xa1),
            contract_address: Address::repeat_byte(contract),
            token_name: "Wrapped Ether".into(),
            token_symbol: "WETH".into(),
            token_type: TokenType::Token,
            spender_address: Address::repeat_byte(0xb2),
            approved_amount: "1000".into(),
            chain: Chain::Arbitrum,
            is_unlimited: false,
        }
    }

    fn store() -> SqliteApprovalStore {
        SqliteApprovalStore::new(Database::in_memory().unwrap())
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let store = store();
        let created = store.create(new_approval(0xc3, Some(7))).await.unwrap();

        let loaded = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.contract_address, Address::repeat_byte(0xc3));
        assert_eq!(loaded.chain, Chain::Arbitrum);
        assert!(!loaded.is_revoked);
    }

    #[tokio::test]
    async fn lists_filter_by_user_chain_and_wallet() {
        let store = store();
        store.create(new_approval(1, Some(7))).await.unwrap();
        store.create(new_approval(2, None)).await.unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 2);
        assert_eq!(store.list(Some(7)).await.unwrap().len(), 1);
        assert_eq!(store.list_by_chain(Chain::Arbitrum).await.unwrap().len(), 2);
        assert!(store.list_by_chain(Chain::Celo).await.unwrap().is_empty());

        let wallet = Address::repeat_byte(0xa1);
        let ids: Vec<i64> = store
            .list_by_wallet(wallet, Chain::Arbitrum)
            .await
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn revoke_and_delete_report_existence() {
        let store = store();
        let created = store.create(new_approval(1, None)).await.unwrap();

        assert!(store.revoke(created.id).await.unwrap());
        assert!(store.revoke(created.id).await.unwrap());
        assert!(!store.revoke(999).await.unwrap());

        let revoked = store.get(created.id).await.unwrap().unwrap();
        assert!(revoked.is_revoked);
        assert!(revoked.updated_at >= revoked.created_at);

        assert!(store.delete(created.id).await.unwrap());
        assert!(!store.delete(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn update_keeps_unset_fields() {
        let store = store();
        let created = store.create(new_approval(1, None)).await.unwrap();

        let updated = store
            .update(
                created.id,
                ApprovalUpdate {
                    spender_address: Some(Address::repeat_byte(0xd4)),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.spender_address, Address::repeat_byte(0xd4));
        assert_eq!(updated.approved_amount, "1000");
        assert_eq!(updated.token_symbol, "WETH");
    }

    #[tokio::test]
    async fn dedup_lookup_matches_contract() {
        let store = store();
        let created = store.create(new_approval(0xc3, None)).await.unwrap();
        let wallet = Address::repeat_byte(0xa1);

        let found = store
            .find_by_contract(wallet, Chain::Arbitrum, Address::repeat_byte(0xc3))
            .await
            .unwrap();
        assert_eq!(found.map(|a| a.id), Some(created.id));

        let missing = store
            .find_by_contract(Address::repeat_byte(0xee), Chain::Arbitrum, Address::repeat_byte(0xc3))
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
