/// Token group knowledge: known contract id sets, runtime discovery and
/// the strict-filter bootstrap state machine.

pub mod bootstrap;
pub mod ids;

pub use bootstrap::{ BootstrapPhase, TokenBootstrap, TokenFilter };
pub use ids::{ SessionIdStore, TokenGroup };

use crate::types::{ AvailableTokens, LoadedCounts, UiTransfer, UiTransferKind };

/// Which known token groups appear anywhere in the loaded rows, swap legs
/// included. Drives filter availability in the UI.
pub fn probe_available_tokens(rows: &[UiTransfer], sessions: &SessionIdStore) -> AvailableTokens {
    let mut available = AvailableTokens::default();
    let mut check = |id: &str, name: &str| {
        if name == "REEF" {
            available.reef = true;
        }
        for (group, flag) in [
            (TokenGroup::Usdc, &mut available.usdc),
            (TokenGroup::Mrd, &mut available.mrd),
        ] {
            if group.matches_name(name)
                || sessions.contains(group, id)
                || group.base_ids().contains(&id.to_lowercase().as_str())
            {
                *flag = true;
            }
        }
    };
    for row in rows {
        check(&row.token.id, &row.token.name);
        if let Some(info) = &row.swap_info {
            check(&info.sold.token.id, &info.sold.token.name);
            check(&info.bought.token.id, &info.bought.token.name);
        }
    }
    available
}

/// Per-direction row counts over a filtered set.
pub fn loaded_counts(rows: &[UiTransfer]) -> LoadedCounts {
    let mut counts = LoadedCounts::default();
    for row in rows {
        match row.kind {
            UiTransferKind::Incoming => counts.incoming += 1,
            UiTransferKind::Outgoing => counts.outgoing += 1,
            UiTransferKind::Swap => counts.swap += 1,
        }
    }
    counts
}
