/// Credit billing
///
/// Integer credit balances per user, atomic consumption by the execution engine and
/// bundle purchases.

pub mod bundles;
pub mod storage;

pub use bundles::{BundleInfo, CreditBundle};
pub use storage::{BalanceStorage, UserPurchase};
