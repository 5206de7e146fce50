use entitle_types::AdminStats;

use crate::Store;
use crate::error::StoreError;

impl Store {
    /// Dashboard aggregates recomputed by scanning resolved rows.
    pub fn admin_stats(&self) -> Result<AdminStats, StoreError> {
        let tx = self.db.unchecked_transaction()?;
        let count = |sql: &str| -> Result<u64, StoreError> {
            let n: i64 = tx.query_row(sql, [], |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or_default())
        };
        let sum = |sql: &str| -> Result<i64, StoreError> {
            Ok(tx.query_row(sql, [], |row| row.get(0))?)
        };

        let stats = AdminStats {
            total_accounts: count("SELECT COUNT(*) FROM accounts")?,
            pending_purchases: count(
                "SELECT COUNT(*) FROM purchase_requests WHERE status = 'pending'",
            )?,
            total_revenue: sum(
                "SELECT COALESCE(SUM(amount), 0) FROM purchase_requests WHERE status = 'approved'",
            )?,
            total_commission: sum("SELECT COALESCE(SUM(amount), 0) FROM commissions")?,
            commission_paid: sum(
                "SELECT COALESCE(SUM(amount), 0) FROM withdrawals WHERE status = 'paid'",
            )?,
        };
        Ok(stats)
    }
}
