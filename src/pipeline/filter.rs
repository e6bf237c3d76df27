/// Client-side token and amount filtering of mapped rows.
///
/// Two matching modes exist per symbolic group: strict (exact known
/// contract ids) and soft (name heuristics). Soft matching is used while
/// the bootstrap machine is in its fallback phase or before any ids have
/// been learned, so a thin id set degrades to permissive name matching
/// instead of an empty page.

use crate::tokens::{ SessionIdStore, TokenFilter, TokenGroup };
use crate::types::{ SwapLeg, TokenMeta, UiTransfer };

#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    pub filter: TokenFilter,
    /// Raw amount bounds applied alongside the token match.
    pub min_raw: Option<u128>,
    pub max_raw: Option<u128>,
    pub soft_fallback_active: bool,
    /// Strict server ids applied to the query, if any.
    pub server_ids_applied: bool,
    pub swap_only: bool,
}

impl RowFilter {
    pub fn apply(&self, rows: Vec<UiTransfer>, sessions: &SessionIdStore) -> Vec<UiTransfer> {
        let mut out: Vec<UiTransfer> = rows
            .into_iter()
            .filter(|row| row.is_swap() == self.swap_only)
            .collect();
        if self.filter == TokenFilter::All {
            return out;
        }
        out.retain(|row| self.row_matches(row, sessions));
        out
    }

    fn row_matches(&self, row: &UiTransfer, sessions: &SessionIdStore) -> bool {
        if let Some(info) = row.swap_info.as_ref() {
            return self.leg_matches(&info.sold, sessions) || self.leg_matches(&info.bought, sessions);
        }
        self.token_matches(&row.token, sessions) && self.amount_in_bounds(row.amount_raw)
    }

    fn leg_matches(&self, leg: &SwapLeg, sessions: &SessionIdStore) -> bool {
        if !self.token_matches(&leg.token, sessions) {
            return false;
        }
        self.amount_in_bounds(leg.amount_raw)
    }

    fn token_matches(&self, token: &TokenMeta, sessions: &SessionIdStore) -> bool {
        match &self.filter {
            TokenFilter::All => true,
            TokenFilter::Reef => token.name.eq_ignore_ascii_case("reef"),
            TokenFilter::Group(group) => {
                if group_id_match(*group, &token.id, sessions) {
                    return true;
                }
                self.name_fallback_enabled() && group.matches_name(&token.name)
            }
            TokenFilter::Contract(addr) => token.id.eq_ignore_ascii_case(addr),
            TokenFilter::Name(name) => {
                token.name.to_lowercase().contains(&name.to_lowercase())
            }
        }
    }

    fn name_fallback_enabled(&self) -> bool {
        self.soft_fallback_active || !self.server_ids_applied
    }

    fn amount_in_bounds(&self, amount: u128) -> bool {
        if self.min_raw.is_none() && self.max_raw.is_none() {
            return true;
        }
        if let Some(min) = self.min_raw {
            if amount < min {
                return false;
            }
        }
        if let Some(max) = self.max_raw {
            if amount > max {
                return false;
            }
        }
        true
    }
}

fn group_id_match(group: TokenGroup, token_id: &str, sessions: &SessionIdStore) -> bool {
    let lower = token_id.to_lowercase();
    group.base_ids().iter().any(|id| *id == lower) || sessions.contains(group, &lower)
}
