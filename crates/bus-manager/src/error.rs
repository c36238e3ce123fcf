/// Errors that can occur during bus operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError<E: core::fmt::Debug> {
    /// The bus factory failed to open the bus.
    FactoryError(E),
    /// Bus identifier is longer than [`MAX_BUS_ID_LEN`](crate::MAX_BUS_ID_LEN).
    InvalidId,
    /// A different bus is already open on this manager.
    IdMismatch,
    /// Bus is currently in use by `n` handles and cannot be released.
    InUse(usize),
    /// Bus manager is in an unrecoverable state.
    Poisoned,
}
