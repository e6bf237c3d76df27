/// Address classification and resolution boundary.
///
/// The feed works for both address encodings of one account. Resolution
/// to the opposite encoding requires chain state, so it sits behind a
/// trait; the built-in resolver is purely syntactic and treats an
/// unresolvable input as "no data", never as an error.

pub trait AddressResolver: Send + Sync {
    fn address_kind(&self, input: &str) -> AddressKind;

    /// Native (substrate) id usable in `where` clauses, if derivable.
    fn resolve_native(&self, input: &str) -> Option<String>;

    /// Checksummed-or-lowercase EVM hex address, if derivable.
    fn resolve_evm(&self, input: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Evm,
    Substrate,
    Invalid,
}

/// Shape-only resolver: no chain lookups, so cross-encoding resolution
/// returns None and the caller falls back to the literal input.
#[derive(Default)]
pub struct SyntacticResolver;

impl AddressResolver for SyntacticResolver {
    fn address_kind(&self, input: &str) -> AddressKind {
        let input = input.trim();
        if is_evm(input) {
            AddressKind::Evm
        } else if is_substrate(input) {
            AddressKind::Substrate
        } else {
            AddressKind::Invalid
        }
    }

    fn resolve_native(&self, input: &str) -> Option<String> {
        match self.address_kind(input) {
            AddressKind::Substrate => Some(input.trim().to_string()),
            _ => None,
        }
    }

    fn resolve_evm(&self, input: &str) -> Option<String> {
        match self.address_kind(input) {
            AddressKind::Evm => Some(input.trim().to_lowercase()),
            _ => None,
        }
    }
}

fn is_evm(input: &str) -> bool {
    input
        .strip_prefix("0x")
        .map(|rest| rest.len() == 40 && rest.bytes().all(|b| b.is_ascii_hexdigit()))
        .unwrap_or(false)
}

/// SS58 shape check: base58 alphabet, plausible length.
fn is_substrate(input: &str) -> bool {
    const BASE58: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    (46..=50).contains(&input.len()) && input.bytes().all(|b| BASE58.contains(&b))
}
