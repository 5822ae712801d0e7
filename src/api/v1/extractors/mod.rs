/*!
 * Request context extractor
 *
 * Public API:
 * - RequestCtx
 */
mod request_ctx;

pub use request_ctx::RequestCtx;
