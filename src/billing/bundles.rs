/// Credit bundles offered for purchase

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditBundle {
    Small,
    Medium,
    Large,
}

/// Bundle description returned by the catalogue endpoint
#[derive(Debug, Clone, Serialize)]
pub struct BundleInfo {
    pub id: CreditBundle,
    pub name: &'static str,
    pub credits: i64,
    pub price_cents: i64,
}

impl CreditBundle {
    pub const ALL: [CreditBundle; 3] = [CreditBundle::Small, CreditBundle::Medium, CreditBundle::Large];

    pub fn as_str(self) -> &'static str {
        match self {
            CreditBundle::Small => "SMALL",
            CreditBundle::Medium => "MEDIUM",
            CreditBundle::Large => "LARGE",
        }
    }

    pub fn credits(self) -> i64 {
        match self {
            CreditBundle::Small => 1_000,
            CreditBundle::Medium => 5_000,
            CreditBundle::Large => 10_000,
        }
    }

    pub fn price_cents(self) -> i64 {
        match self {
            CreditBundle::Small => 999,
            CreditBundle::Medium => 3_999,
            CreditBundle::Large => 6_999,
        }
    }

    pub fn info(self) -> BundleInfo {
        let name = match self {
            CreditBundle::Small => "Small Pack",
            CreditBundle::Medium => "Medium Pack",
            CreditBundle::Large => "Large Pack",
        };
        BundleInfo {
            id: self,
            name,
            credits: self.credits(),
            price_cents: self.price_cents(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigger_bundles_are_cheaper_per_credit() {
        let per_credit: Vec<f64> = CreditBundle::ALL
            .iter()
            .map(|b| b.price_cents() as f64 / b.credits() as f64)
            .collect();
        assert!(per_credit.windows(2).all(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn bundle_ids_parse_from_json() {
        let bundle: CreditBundle = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(bundle, CreditBundle::Medium);
        assert_eq!(bundle.credits(), 5_000);
    }
}
