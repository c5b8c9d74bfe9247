//! Cross-basket statistics, accumulated one basket at a time.

use serde::{Deserialize, Serialize};

/// Summary of one basket as seen by a stats scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketInfo {
    pub name: String,
    pub requests_count: usize,
    pub requests_total_count: u64,
    /// Unix milliseconds of the newest stored request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_request_date: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub baskets_count: usize,
    pub empty_baskets_count: usize,
    pub requests_count: usize,
    pub requests_total_count: u64,
    pub max_basket_size: usize,
    pub avg_basket_size: usize,
    pub top_baskets_size: Vec<BasketInfo>,
    pub top_baskets_recent: Vec<BasketInfo>,
    /// Set when a scan over several backend pages was cut short.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl DatabaseStats {
    /// Folds one basket into the running totals and the top-`max` rankings.
    pub fn collect(&mut self, info: BasketInfo, max: usize) {
        self.baskets_count += 1;
        if info.requests_count == 0 {
            self.empty_baskets_count += 1;
        }
        self.requests_count += info.requests_count;
        self.requests_total_count += info.requests_total_count;
        self.max_basket_size = self.max_basket_size.max(info.requests_count);

        if info.last_request_date.is_some() {
            insert_ranked(&mut self.top_baskets_recent, info.clone(), max, |a, b| {
                a.last_request_date > b.last_request_date
            });
        }
        insert_ranked(&mut self.top_baskets_size, info, max, |a, b| {
            a.requests_count > b.requests_count
        });
    }

    /// Computes derived values once every basket has been collected.
    pub fn finalize(&mut self) {
        self.avg_basket_size = self
            .requests_count
            .checked_div(self.baskets_count)
            .unwrap_or(0);
    }
}

/// Inserts `info` before the first entry it strictly outranks, so ties keep
/// arrival order, then trims the list to `max`.
fn insert_ranked<F>(list: &mut Vec<BasketInfo>, info: BasketInfo, max: usize, outranks: F)
where
    F: Fn(&BasketInfo, &BasketInfo) -> bool,
{
    if max == 0 {
        return;
    }
    let pos = list
        .iter()
        .position(|existing| outranks(&info, existing))
        .unwrap_or(list.len());
    if pos >= max {
        return;
    }
    list.insert(pos, info);
    list.truncate(max);
}
