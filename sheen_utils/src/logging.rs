#[macro_export]
macro_rules! debug_panic {
    () => ( if cfg!(debug_assertions) { panic!(); } );
    ($($arg:tt)*) => ( if cfg!(debug_assertions) { panic!($($arg)*); } else { $crate::tracing::error!($($arg)*); } );
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "format 7 is not handled")]
    fn debug_panic_panics_in_debug_builds() {
        debug_panic!("format {} is not handled", 7);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn debug_panic_only_logs_in_release_builds() {
        debug_panic!("format {} is not handled", 7);
    }
}
