//! Shorthand for building effects inside reducers.

/// Wrap an async block in an [`Effect::Future`](crate::effect::Effect::Future).
///
/// The block is `async move`, so clone whatever it needs out of the
/// environment before invoking the macro.
///
/// ```rust,ignore
/// use pgstay_core::async_effect;
///
/// let gateway = Arc::clone(&env.gateway);
/// async_effect! {
///     match gateway.create_order(amount, &currency, &receipt).await {
///         Ok(order) => Some(BookingAction::PaymentOrderOpened { order }),
///         Err(error) => Some(BookingAction::PaymentOrderFailed { reason: error.to_string() }),
///     }
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}
