//! Chain ID to feed-specific network names.

pub const BASE_CHAIN_ID: i64 = 8453;
pub const ETHEREUM_CHAIN_ID: i64 = 1;

/// CoinGecko asset platform identifier
pub fn coingecko_platform(chain_id: i64) -> Option<&'static str> {
    match chain_id {
        ETHEREUM_CHAIN_ID => Some("ethereum"),
        10 => Some("optimistic-ethereum"),
        137 => Some("polygon-pos"),
        BASE_CHAIN_ID => Some("base"),
        42161 => Some("arbitrum-one"),
        _ => None,
    }
}

/// GeckoTerminal network identifier
pub fn geckoterminal_network(chain_id: i64) -> Option<&'static str> {
    match chain_id {
        ETHEREUM_CHAIN_ID => Some("eth"),
        10 => Some("optimism"),
        137 => Some("polygon_pos"),
        BASE_CHAIN_ID => Some("base"),
        42161 => Some("arbitrum"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_chains() {
        assert_eq!(coingecko_platform(BASE_CHAIN_ID), Some("base"));
        assert_eq!(geckoterminal_network(ETHEREUM_CHAIN_ID), Some("eth"));
        assert_eq!(coingecko_platform(999_999), None);
        assert_eq!(geckoterminal_network(999_999), None);
    }
}
