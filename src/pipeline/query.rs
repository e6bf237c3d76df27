/// GraphQL variable construction for the paginated transfers query.
///
/// The server speaks the subsquid filter dialect: a `where` object of
/// nested `AND`/`OR` clauses with typed comparison suffixes, and an
/// `orderBy` list of enum strings.

use serde_json::{ json, Value };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Any,
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "incoming" | "in" => Direction::Incoming,
            "outgoing" | "out" => Direction::Outgoing,
            _ => Direction::Any,
        }
    }
}

/// The per-session query shape; everything needed to build `where` and
/// `orderBy` variables for one address and filter combination.
#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    /// Resolved native account id. Empty means unresolved, no query.
    pub native_address: String,
    pub direction: Direction,
    /// Raw (unscaled) amount bounds as decimal strings.
    pub min_amount: Option<String>,
    pub max_amount: Option<String>,
    /// Strict token-contract id set from the bootstrap machine.
    pub token_ids: Option<Vec<String>>,
    /// Restrict to the native REEF token.
    pub reef_only: bool,
    /// Soft-fallback widening: any ERC20 row, filtered by name client-side.
    pub erc20_only: bool,
    /// Swap view only wants rows carrying a reefswap action tag.
    pub swap_only: bool,
}

impl FeedQuery {
    pub fn for_address(native_address: &str) -> Self {
        Self { native_address: native_address.to_string(), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.native_address.is_empty()
    }

    /// True when results should be ordered by amount instead of time.
    pub fn amount_filter_active(&self) -> bool {
        self.min_amount.is_some() || self.max_amount.is_some()
    }

    /// Server-side sort. The connection is always walked newest-first;
    /// amount ordering is applied client-side after the merge.
    pub fn order_by(&self) -> Value {
        json!(["timestamp_DESC"])
    }

    pub fn build_where(&self) -> Value {
        let mut clauses: Vec<Value> = Vec::new();

        clauses.push(match self.direction {
            Direction::Any => json!({
                "OR": [
                    { "from": { "id_eq": self.native_address } },
                    { "to": { "id_eq": self.native_address } },
                ]
            }),
            Direction::Incoming => json!({ "to": { "id_eq": self.native_address } }),
            Direction::Outgoing => json!({ "from": { "id_eq": self.native_address } }),
        });

        if let Some(min) = &self.min_amount {
            clauses.push(json!({ "amount_gte": min }));
        }
        if let Some(max) = &self.max_amount {
            clauses.push(json!({ "amount_lte": max }));
        }

        if let Some(ids) = self.token_ids.as_ref().filter(|ids| !ids.is_empty()) {
            clauses.push(json!({ "token": { "id_in": ids } }));
        } else if self.reef_only {
            clauses.push(json!({ "type_eq": "Native" }));
        } else if self.erc20_only {
            clauses.push(json!({ "type_eq": "ERC20" }));
        }

        if self.swap_only {
            clauses.push(json!({ "reefswapAction_isNull": false }));
        }

        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            json!({ "AND": clauses })
        }
    }
}
