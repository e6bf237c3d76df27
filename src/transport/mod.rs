/// Transport boundary for the two GraphQL backends.
///
/// The pipeline talks to an abstract `FeedTransport` carrying raw query
/// documents and variables; typed helpers here parse the response JSON
/// into the canonical shapes. Tests substitute their own transport.

pub mod http;

pub use http::HttpTransport;

use crate::errors::{ DataError, FeedError, FeedResult };
use crate::types::{ PoolEventNode, Transfer, TransfersConnection };
use async_trait::async_trait;
use serde_json::Value;

/// Which backend a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Explorer,
    SwapSquid,
}

#[derive(Debug, Clone)]
pub struct GraphqlRequest {
    pub query: &'static str,
    pub variables: Value,
}

#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Execute one GraphQL request and return the `data` object. A
    /// GraphQL error payload surfaces as `DataError::GraphqlErrors`.
    async fn query(&self, endpoint: Endpoint, request: GraphqlRequest) -> FeedResult<Value>;
}

// =============================================================================
// QUERY DOCUMENTS
// =============================================================================

pub const PAGINATED_TRANSFERS_QUERY: &str = r#"
query TransfersQuery($first: Int!, $after: String, $where: TransferWhereInput, $orderBy: [TransferOrderByInput!]!) {
  transfersConnection(orderBy: $orderBy, first: $first, after: $after, where: $where) {
    edges {
      node {
        id
        amount
        timestamp
        success
        type
        extrinsicHash
        extrinsicId
        signedData
        reefswapAction
        from { id evmAddress }
        to { id evmAddress }
        token { id name contractData }
      }
    }
    pageInfo { hasNextPage endCursor }
    totalCount
  }
}
"#;

/// Offset/limit flat list, used for the fast window path and partner
/// backfill.
pub const TRANSFERS_WINDOW_QUERY: &str = r#"
query TransfersWindowQuery($where: TransferWhereInput, $orderBy: [TransferOrderByInput!], $offset: Int, $limit: Int) {
  transfers(where: $where, orderBy: $orderBy, offset: $offset, limit: $limit) {
    id
    amount
    timestamp
    success
    type
    extrinsicHash
    extrinsicId
    signedData
    reefswapAction
    from { id evmAddress }
    to { id evmAddress }
    token { id name contractData }
  }
}
"#;

pub const POOL_EVENTS_QUERY: &str = r#"
query PoolEventsConnection($first: Int!, $after: String, $addr: String!) {
  poolEventsConnection(
    first: $first
    after: $after
    where: {
      AND: [
        { type_eq: Swap }
        { OR: [
            { senderAddress_containsInsensitive: $addr }
            { toAddress_containsInsensitive: $addr }
          ]
        }
      ]
    }
    orderBy: [blockHeight_DESC, indexInBlock_DESC, id_DESC]
  ) {
    edges {
      node {
        id
        blockHeight
        indexInBlock
        timestamp
        type
        pool {
          id
          token1 { id name decimals }
          token2 { id name decimals }
        }
        senderAddress
        toAddress
        amount1
        amount2
        amountIn1
        amountIn2
      }
    }
    pageInfo { hasNextPage endCursor }
  }
}
"#;

pub const VERIFIED_CONTRACTS_BY_NAME_QUERY: &str = r#"
query VerifiedContractsByName($name: String!) {
  verifiedContracts(where: { name_containsInsensitive: $name }, limit: 10) {
    id
    name
  }
}
"#;

// =============================================================================
// TYPED HELPERS
// =============================================================================

/// Cursor-paginated transfers page.
pub async fn fetch_transfers_connection(
    transport: &dyn FeedTransport,
    first: usize,
    after: Option<&str>,
    where_clause: Value,
    order_by: Value,
) -> FeedResult<TransfersConnection> {
    let data = transport
        .query(Endpoint::Explorer, GraphqlRequest {
            query: PAGINATED_TRANSFERS_QUERY,
            variables: serde_json::json!({
                "first": first,
                "after": after,
                "where": where_clause,
                "orderBy": order_by,
            }),
        })
        .await?;
    extract(&data, "transfersConnection")
}

/// One-shot offset window of transfers.
pub async fn fetch_transfers_window(
    transport: &dyn FeedTransport,
    offset: usize,
    limit: usize,
    where_clause: Value,
    order_by: Value,
) -> FeedResult<Vec<Transfer>> {
    let data = transport
        .query(Endpoint::Explorer, GraphqlRequest {
            query: TRANSFERS_WINDOW_QUERY,
            variables: serde_json::json!({
                "where": where_clause,
                "orderBy": order_by,
                "offset": offset,
                "limit": limit,
            }),
        })
        .await?;
    extract(&data, "transfers")
}

/// Flat list of transfers matching a batch of extrinsic hashes.
pub async fn fetch_transfers_by_hashes(
    transport: &dyn FeedTransport,
    hashes: &[String],
    limit: usize,
) -> FeedResult<Vec<Transfer>> {
    let data = transport
        .query(Endpoint::Explorer, GraphqlRequest {
            query: TRANSFERS_WINDOW_QUERY,
            variables: serde_json::json!({
                "where": { "extrinsicHash_in": hashes },
                "orderBy": ["timestamp_DESC"],
                "offset": 0,
                "limit": limit,
            }),
        })
        .await?;
    extract(&data, "transfers")
}

/// Pool events touching an address, newest first.
pub async fn fetch_pool_events(
    transport: &dyn FeedTransport,
    first: usize,
    after: Option<&str>,
    address: &str,
) -> FeedResult<(Vec<PoolEventNode>, crate::types::PageInfo)> {
    let data = transport
        .query(Endpoint::SwapSquid, GraphqlRequest {
            query: POOL_EVENTS_QUERY,
            variables: serde_json::json!({
                "first": first,
                "after": after,
                "addr": address,
            }),
        })
        .await?;

    let conn = data
        .get("poolEventsConnection")
        .ok_or_else(|| missing("poolEventsConnection"))?;
    let nodes = conn
        .get("edges")
        .and_then(Value::as_array)
        .map(|edges| {
            edges
                .iter()
                .filter_map(|e| e.get("node"))
                .filter_map(|n| serde_json::from_value(n.clone()).ok())
                .collect()
        })
        .unwrap_or_default();
    let page_info = conn
        .get("pageInfo")
        .and_then(|pi| serde_json::from_value(pi.clone()).ok())
        .unwrap_or_default();
    Ok((nodes, page_info))
}

/// Contract ids of verified contracts whose name matches. Best-effort
/// bootstrap lookup.
pub async fn lookup_verified_contract_ids(
    transport: &dyn FeedTransport,
    name: &str,
) -> FeedResult<Vec<String>> {
    let data = transport
        .query(Endpoint::Explorer, GraphqlRequest {
            query: VERIFIED_CONTRACTS_BY_NAME_QUERY,
            variables: serde_json::json!({ "name": name }),
        })
        .await?;
    let ids = data
        .get("verifiedContracts")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|c| c.get("id").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    Ok(ids)
}

fn extract<T: serde::de::DeserializeOwned>(data: &Value, field: &str) -> FeedResult<T> {
    let value = data.get(field).ok_or_else(|| missing(field))?;
    serde_json::from_value(value.clone()).map_err(|e| FeedError::parse(field, e.to_string()))
}

fn missing(field: &str) -> FeedError {
    FeedError::Data(DataError::MissingField {
        context: "graphql response".to_string(),
        field: field.to_string(),
    })
}

/// Split a GraphQL response body into data or an error list. Shared by
/// transport implementations.
pub fn split_graphql_body(body: Value) -> FeedResult<Value> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown graphql error")
                        .to_string()
                })
                .collect();
            return Err(FeedError::Data(DataError::GraphqlErrors { messages }));
        }
    }
    body.get("data")
        .cloned()
        .ok_or_else(|| missing("data"))
}
