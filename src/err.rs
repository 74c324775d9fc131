use core::fmt::Debug;

/// `BaseError` is a common trait implemented by every error type defined in
/// this crate.
///
/// It is dependent on the [`Debug`] trait, which makes sense as we are
/// dealing with errors.
pub trait BaseError: Debug {}

/// `CanFail` is a return type for functions that are allowed to fail, and
/// don't need to return anything.
pub type CanFail<T> = Result<(), T>;

/// `DiagError` defines the failure modes of diagnostic sink registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagError {
    /// A diagnostic sink is already registered; the first one stays in
    /// place for the lifetime of the process.
    AlreadyRegistered,
}

impl BaseError for DiagError {}

/// `AllocError` defines the failure modes of an allocation request.
///
/// Both variants translate to a null pointer at the raw pointer interface.
/// The allocator state is left untouched when an allocation fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// No free block large enough to satisfy the request is available.
    OutOfMemory,

    /// The requested size, once rounded up with its header, exceeds the
    /// capacity of the backing arena.
    RequestTooLarge,
}

impl BaseError for AllocError {}
