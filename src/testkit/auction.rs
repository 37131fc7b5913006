//! Scripted [`AuctionClient`] for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::bid::Bid;
use crate::domain::id::AuctionId;
use crate::port::outbound::auction::{
    AuctionClient, AuctionError, AuctionRequest, AuctionResponse,
};

/// Auction client returning queued results, then a fallback forever.
pub struct ScriptedAuctionClient {
    queued: Mutex<VecDeque<Result<AuctionResponse, AuctionError>>>,
    fallback: Result<AuctionResponse, AuctionError>,
    requests: Mutex<Vec<AuctionRequest>>,
    calls: AtomicU32,
}

impl ScriptedAuctionClient {
    pub fn returning(result: Result<AuctionResponse, AuctionError>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: result,
            requests: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Always answer with `bids` under `auction-1`.
    pub fn with_bids(bids: Vec<Bid>) -> Self {
        Self::returning(Ok(response(bids)))
    }

    pub fn failing(error: AuctionError) -> Self {
        Self::returning(Err(error))
    }

    /// Answer the next call with `result` before falling back.
    pub fn then(self, result: Result<AuctionResponse, AuctionError>) -> Self {
        self.queued.lock().push_back(result);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<AuctionRequest> {
        self.requests.lock().clone()
    }
}

/// A successful response carrying `bids`.
pub fn response(bids: Vec<Bid>) -> AuctionResponse {
    AuctionResponse {
        auction_id: Some(AuctionId::from("auction-1")),
        bids,
        headers: Default::default(),
    }
}

#[async_trait]
impl AuctionClient for ScriptedAuctionClient {
    async fn fetch_bids(&self, request: &AuctionRequest) -> Result<AuctionResponse, AuctionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let queued = self.queued.lock().pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }
}
