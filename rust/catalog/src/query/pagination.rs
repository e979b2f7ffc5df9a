//! Page/limit windows and the pagination metadata returned with list
//! responses.

use crate::params::QuerySpec;
use serde::Serialize;

pub const PAGE_PARAM: &str = "page";
pub const LIMIT_PARAM: &str = "limit";

/// Per-endpoint limit defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl LimitPolicy {
    pub fn new(default_limit: i64, max_limit: i64) -> Self {
        let default_limit = default_limit.max(1);
        Self {
            default_limit,
            max_limit: max_limit.max(default_limit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn skip(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationWindow {
    pub current_page: i64,
    pub limit: i64,
    #[serde(skip_serializing)]
    pub skip: i64,
    pub number_of_pages: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<i64>,
}

impl PaginationWindow {
    pub fn compute(request: PageRequest, total_count: i64) -> Self {
        let total_count = total_count.max(0);
        let skip = request.skip();
        let end_index = request.page.saturating_mul(request.limit);

        Self {
            current_page: request.page,
            limit: request.limit,
            skip,
            number_of_pages: page_count(total_count, request.limit),
            next: (end_index < total_count).then(|| request.page + 1),
            prev: (skip > 0).then(|| request.page - 1),
        }
    }
}

fn page_count(total_count: i64, limit: i64) -> i64 {
    if total_count == 0 {
        0
    } else {
        (total_count - 1) / limit.max(1) + 1
    }
}

/// Non-numeric or non-positive values fall back to defaults.
pub fn build_page_request(params: &QuerySpec, policy: LimitPolicy) -> PageRequest {
    let page = positive_int(params, PAGE_PARAM).unwrap_or(1);
    let limit = positive_int(params, LIMIT_PARAM)
        .unwrap_or(policy.default_limit)
        .min(policy.max_limit);

    PageRequest { page, limit }
}

pub fn build_pagination(
    params: &QuerySpec,
    total_count: i64,
    policy: LimitPolicy,
) -> PaginationWindow {
    PaginationWindow::compute(build_page_request(params, policy), total_count)
}

fn positive_int(params: &QuerySpec, key: &str) -> Option<i64> {
    params
        .scalar(key)
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|value| *value >= 1)
}
