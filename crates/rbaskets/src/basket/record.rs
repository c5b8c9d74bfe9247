//! State of a single basket and the operations over it.
//!
//! Every backend stores baskets as a `BasketRecord` (held in memory, mirrored
//! to a JSON document, or reassembled from rows), so retention, pagination and
//! search behave identically whatever the storage.

use super::paging;
use super::request::RequestData;
use super::stats::BasketInfo;
use super::token::tokens_equal;
use super::types::{
    BasketConfig, RequestsPage, RequestsQueryPage, ResponseConfig, SearchField,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BasketRecord {
    pub token: String,
    pub config: BasketConfig,
    /// Newest first.
    pub requests: VecDeque<RequestData>,
    /// Requests ever captured, including evicted and cleared ones.
    pub total_count: u64,
    /// Keyed by uppercase method.
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseConfig>,
}

impl BasketRecord {
    pub fn new(token: String, config: BasketConfig) -> Self {
        Self {
            token,
            config,
            requests: VecDeque::new(),
            total_count: 0,
            responses: BTreeMap::new(),
        }
    }

    /// Stores `request` as the newest entry and evicts the oldest past capacity.
    pub fn add(&mut self, request: RequestData) -> RequestData {
        self.requests.push_front(request.clone());
        self.total_count += 1;
        self.requests.truncate(self.config.capacity);
        request
    }

    /// Replaces the config, dropping the oldest requests if capacity shrank.
    pub fn update(&mut self, config: BasketConfig) {
        self.config = config;
        self.requests.truncate(self.config.capacity);
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }

    pub fn size(&self) -> usize {
        self.requests.len()
    }

    pub fn authorize(&self, token: &str) -> bool {
        tokens_equal(&self.token, token)
    }

    pub fn set_response(&mut self, method: &str, response: ResponseConfig) {
        self.responses.insert(method.to_ascii_uppercase(), response);
    }

    pub fn get_response(&self, method: &str) -> Option<ResponseConfig> {
        self.responses.get(&method.to_ascii_uppercase()).cloned()
    }

    pub fn get_requests(&self, max: usize, skip: usize) -> RequestsPage {
        let (start, end, has_more) = paging::window(self.requests.len(), max, skip);
        RequestsPage {
            requests: self.requests.range(start..end).cloned().collect(),
            count: self.requests.len(),
            total_count: self.total_count,
            has_more,
        }
    }

    pub fn find_requests(
        &self,
        query: &str,
        field: SearchField,
        max: usize,
        skip: usize,
    ) -> RequestsQueryPage {
        let (found, has_more) = paging::find(self.requests.iter(), max, skip, |req| {
            req.matches(query, field)
        });
        RequestsQueryPage {
            requests: found.into_iter().cloned().collect(),
            has_more,
        }
    }

    pub fn info(&self, name: &str) -> BasketInfo {
        BasketInfo {
            name: name.to_string(),
            requests_count: self.requests.len(),
            requests_total_count: self.total_count,
            last_request_date: self.requests.front().map(|r| r.date),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn request_with_body(body: &str) -> RequestData {
        RequestData {
            date: chrono::Utc::now().timestamp_millis(),
            method: "POST".to_string(),
            path: "/test".to_string(),
            content_length: body.len(),
            body: body.to_string(),
            ..Default::default()
        }
    }

    fn record(capacity: usize) -> BasketRecord {
        BasketRecord::new("secret".to_string(), BasketConfig::with_capacity(capacity))
    }

    #[test]
    fn test_capacity_bounds_stored_requests() {
        let mut rec = record(10);
        for i in 1..=35 {
            rec.add(request_with_body(&format!("req{i}")));
        }
        assert_eq!(rec.size(), 10);
        assert_eq!(rec.total_count, 35);
        assert_eq!(rec.requests[0].body, "req35");
        assert_eq!(rec.requests[9].body, "req26");
    }

    #[test]
    fn test_get_requests_pages() {
        let mut rec = record(25);
        for i in 1..=35 {
            rec.add(request_with_body(&format!("req{i}")));
        }

        let page = rec.get_requests(10, 0);
        assert_eq!(page.requests.len(), 10);
        assert_eq!(page.count, 25);
        assert_eq!(page.total_count, 35);
        assert!(page.has_more);
        assert_eq!(page.requests[0].body, "req35");
        assert_eq!(page.requests[9].body, "req26");

        let page = rec.get_requests(10, 20);
        assert_eq!(page.requests.len(), 5);
        assert!(!page.has_more);
        assert_eq!(page.requests[4].body, "req11");

        let page = rec.get_requests(10, 30);
        assert!(page.requests.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_find_requests_by_header() {
        let mut rec = record(50);
        for i in 0..30 {
            let mut req = request_with_body(&format!("body {i}"));
            if i < 10 {
                req.headers
                    .insert("Chocopie".to_string(), vec!["yummy".to_string()]);
            }
            rec.add(req);
        }

        let page = rec.find_requests("yummy", SearchField::Headers, 20, 0);
        assert_eq!(page.requests.len(), 10);
        assert!(!page.has_more);

        let page = rec.find_requests("yummy", SearchField::Headers, 5, 0);
        assert_eq!(page.requests.len(), 5);
        assert!(page.has_more);

        let page = rec.find_requests("yummy", SearchField::Body, 20, 0);
        assert!(page.requests.is_empty());
    }

    #[test]
    fn test_update_truncates_oldest() {
        let mut rec = record(20);
        for i in 1..=20 {
            rec.add(request_with_body(&format!("req{i}")));
        }
        rec.update(BasketConfig::with_capacity(5));
        assert_eq!(rec.size(), 5);
        assert_eq!(rec.requests[0].body, "req20");
        assert_eq!(rec.requests[4].body, "req16");
        assert_eq!(rec.total_count, 20);
    }

    #[test]
    fn test_clear_keeps_total_count() {
        let mut rec = record(5);
        for i in 0..3 {
            rec.add(request_with_body(&i.to_string()));
        }
        rec.clear();
        assert_eq!(rec.size(), 0);
        assert_eq!(rec.total_count, 3);
        assert_eq!(rec.info("x").last_request_date, None);
    }

    #[test]
    fn test_responses_keyed_by_uppercase_method() {
        let mut rec = record(5);
        let response = ResponseConfig {
            status: 201,
            ..Default::default()
        };
        rec.set_response("post", response.clone());
        assert_eq!(rec.get_response("POST"), Some(response));
        assert_eq!(rec.get_response("GET"), None);
    }

    #[test]
    fn test_authorize() {
        let rec = record(5);
        assert!(rec.authorize("secret"));
        assert!(!rec.authorize("Secret"));
        assert!(!rec.authorize(""));
    }
}
