use serde::{Deserialize, Serialize};

use super::{Coins, InventoryItem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinsReceived {
    pub from_user: String,
    pub amount: Coins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinsSent {
    pub to_user: String,
    pub amount: Coins,
}

/// Cumulative transfer totals per counterparty, split by direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinHistory {
    pub received: Vec<CoinsReceived>,
    pub sent: Vec<CoinsSent>,
}

impl CoinHistory {
    pub fn total_received(&self) -> Coins {
        self.received.iter().map(|r| r.amount).sum()
    }

    pub fn total_sent(&self) -> Coins {
        self.sent.iter().map(|s| s.amount).sum()
    }
}

/// Everything a user sees about their own account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub coins: Coins,
    pub inventory: Vec<InventoryItem>,
    pub coin_history: CoinHistory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_serializes_as_arrays() {
        let info = AccountInfo {
            coins: 1000,
            inventory: vec![],
            coin_history: CoinHistory::default(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["coinHistory"]["sent"], serde_json::json!([]));
        assert_eq!(json["coinHistory"]["received"], serde_json::json!([]));
        assert_eq!(json["inventory"], serde_json::json!([]));
    }

    #[test]
    fn test_history_totals() {
        let history = CoinHistory {
            received: vec![
                CoinsReceived { from_user: "bob".into(), amount: 30 },
                CoinsReceived { from_user: "carol".into(), amount: 5 },
            ],
            sent: vec![CoinsSent { to_user: "bob".into(), amount: 100 }],
        };
        assert_eq!(history.total_received(), 35);
        assert_eq!(history.total_sent(), 100);
    }

    #[test]
    fn test_inventory_uses_type_key() {
        let line = InventoryItem { item_type: "cup".into(), quantity: 2 };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["type"], "cup");
        assert_eq!(json["quantity"], 2);
    }
}
