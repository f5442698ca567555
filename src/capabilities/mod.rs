mod delay;
mod http;
mod kv;

pub use self::delay::{Delay, DelayDone, DelayOperation};
pub use self::http::{
    Http, HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpResult,
    DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS,
};
pub use self::kv::{KeyValue, KvError, KvOperation, KvOutput, KvResult, StorageKey};

// The built-in Render capability covers view invalidation as-is.
pub use crux_core::render::Render;

use crate::app::App;
use crate::event::Event;

// The effect derive reads the event type out of each field's generic
// argument, so the capability types must be spelled out here.
#[derive(crux_core::macros::Effect)]
#[effect(app = "App")]
pub struct Capabilities {
    pub http: Http<Event>,
    pub kv: KeyValue<Event>,
    pub delay: Delay<Event>,
    pub render: Render<Event>,
}
