//! Fast shutter held open around a whole raster.

use std::future::Future;

use tracing::{debug, warn};

use crate::error::{AppResult, DeviceContext};
use crate::hardware::capabilities::Shutter;

/// Open `shutter`, run `body`, and close the shutter on every exit path.
///
/// If `body` fails its error is returned even when closing also fails; a
/// close failure is only reported for a successful body. If opening fails
/// the body never runs.
pub async fn run_with_shutter<S, F, T>(shutter_id: &str, shutter: &S, body: F) -> AppResult<T>
where
    S: Shutter + ?Sized,
    F: Future<Output = AppResult<T>>,
{
    shutter.open().await.device_context(shutter_id, "open")?;
    debug!(shutter = shutter_id, "shutter open");

    let result = body.await;

    let closed = shutter.close().await.device_context(shutter_id, "close");
    match (result, closed) {
        (Ok(value), Ok(())) => {
            debug!(shutter = shutter_id, "shutter closed");
            Ok(value)
        }
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(shutter = shutter_id, error = %close_err, "shutter failed to close after error");
            Err(err)
        }
    }
}
