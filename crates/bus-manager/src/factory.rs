/// Opens and closes a named bus.
///
/// Implementors define how a bus identifier (for example `"I2C1"` or
/// `"/dev/i2c-1"`) and the owned resources turn into a usable bus, and how
/// those resources are recovered when the bus is closed.
pub trait BusFactory {
    /// The bus type shared among handles. Usually a mutex around the
    /// peripheral so every transaction is serialized.
    type Bus;
    /// Resources needed to open the bus (peripheral handles, pins, ...).
    type Resources;
    /// Opaque token that can reconstruct [`Resources`](Self::Resources) after the bus is dropped.
    type Destructor;
    /// Error type for bus creation failures.
    type Error: core::fmt::Debug;

    /// Open the bus called `id` from the given resources.
    ///
    /// On failure, returns the error **and** the original resources so they are not lost.
    fn create(
        resources: Self::Resources,
        id: &str,
    ) -> Result<(Self::Bus, Self::Destructor), (Self::Error, Self::Resources)>;

    /// Recover the original resources from a destructor token.
    fn recover(destructor: Self::Destructor) -> Self::Resources;
}
