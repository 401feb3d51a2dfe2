//! Metric names and the Prometheus recorder behind `/metrics`.

use metrics::describe_counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const POSTS_CREATED: &str = "posts_created_total";
pub const COMMENTS_CREATED: &str = "comments_created_total";
pub const LIKES: &str = "likes_total";
pub const NOTIFICATIONS_CREATED: &str = "notifications_created_total";

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the global recorder on first call; later calls return the same handle.
pub fn install() -> Result<&'static PrometheusHandle, BuildError> {
    HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_counter!(POSTS_CREATED, "Posts created.");
        describe_counter!(COMMENTS_CREATED, "Comments and replies created.");
        describe_counter!(LIKES, "Likes recorded on posts, comments and replies.");
        describe_counter!(NOTIFICATIONS_CREATED, "Notifications delivered to users.");
        Ok(handle)
    })
}

/// Prometheus text exposition; empty until [`install`] has run.
pub fn render() -> String {
    HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}

pub fn post_created() {
    metrics::counter!(POSTS_CREATED).increment(1);
}

pub fn comment_created() {
    metrics::counter!(COMMENTS_CREATED).increment(1);
}

pub fn like_recorded(target: &'static str) {
    metrics::counter!(LIKES, "target" => target).increment(1);
}

pub fn notification_created(kind: &'static str) {
    metrics::counter!(NOTIFICATIONS_CREATED, "kind" => kind).increment(1);
}
