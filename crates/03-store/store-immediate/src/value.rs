/// A client type's registered description and namespace prefix.
///
/// Stands in for "any client type with a registered description and a
/// prefix" — the typed store calls [`Self::description`] to label telemetry
/// samples and [`Self::prefix`] to namespace keys within the shared arena.
pub trait ValueDescriptor {
    /// Human-readable label used as the telemetry sample's key.
    fn description() -> &'static str;

    /// Numeric namespace this value type's keys are constructed under.
    fn prefix() -> u32;
}
