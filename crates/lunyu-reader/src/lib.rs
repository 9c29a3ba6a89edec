pub mod handlers;
pub mod index;
pub mod paraphrase;
pub mod query;
pub mod rate_limit;
pub mod retry;

pub use handlers::{AppState, router};
pub use index::FlatIndex;
pub use paraphrase::{GeminiClient, ParaphraseError, Paraphraser, Prompt, TextCompletion};
pub use query::{OrderMode, ViewQuery};
pub use retry::{RetryPolicy, retry, retry_if};
