/// A macro to simplify memoization through the in-process cache tier.
///
/// This macro checks if a value is present in the cache.
/// If found, it returns the cached value.
/// If not found, it executes the provided block to compute the value,
/// stores it in the cache, and then returns the computed value.
///
/// # Arguments
/// * `$cache`: The `TieredCache` to read from and write to.
/// * `$namespace`: Cache namespace.
/// * `$key`: Key within the namespace.
/// * `$ttl`: `std::time::Duration` the computed value stays fresh.
/// * `$block`: Future computing the value on a miss. Errors propagate and
///   nothing is cached.
///
/// # Example
/// ```rust,ignore
/// let results = memoized!(cache, "search", key, Duration::from_secs(3600), async move {
///     fetch_results().await
/// });
/// ```
#[macro_export]
macro_rules! memoized {
    ($cache:expr, $namespace:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get($namespace, &$key) {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set($namespace, &$key, &value, $ttl);
            Ok(value)
        }
    }};
}
