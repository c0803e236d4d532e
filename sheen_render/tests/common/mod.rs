use sheen_render::State;

/// A headless device, or `None` on machines without any adapter.
pub fn gpu() -> Option<State> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    match State::headless() {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!("Skipping GPU test: {e}");
            None
        }
    }
}
