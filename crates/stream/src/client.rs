//! Feed subscription interface
//!
//! `FeedClient` opens a subscription; `FeedSubscription` yields frames until
//! the server closes the stream or the connection fails.

use std::future::Future;

use contracts::{FeedFrame, TopicFilter};

use crate::error::Result;

/// Parameters of one subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// Topics to receive; empty selects all
    pub topics: TopicFilter,
    /// First feed position to deliver (inclusive)
    pub start_index: u64,
    /// Namespace, `*` for all
    pub namespace: String,
}

/// An open event stream
#[trait_variant::make(FeedSubscription: Send)]
pub trait LocalFeedSubscription {
    /// Next frame, `Ok(None)` once the server has closed the stream
    async fn next_frame(&mut self) -> Result<Option<FeedFrame>>;
}

/// Opens event stream subscriptions
pub trait FeedClient {
    /// Subscription type produced by this client
    type Subscription: FeedSubscription;

    /// Open a subscription
    ///
    /// # Errors
    /// `StreamError::Connect` when the feed is unreachable or refuses the
    /// request.
    fn subscribe(
        &self,
        request: &SubscribeRequest,
    ) -> impl Future<Output = Result<Self::Subscription>> + Send;
}
