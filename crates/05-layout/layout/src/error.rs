use thiserror::Error;

pub type LayoutResult<T> = Result<T, LayoutError>;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("layout construction attempted after sealing")]
    ConstructionAfterSeal,

    #[error("operation valid only on a sealed lattice (or on Top) attempted on an unsealed, non-Top layout")]
    OperationOnUnsealedNonTop,

    #[error("duplicate layout index {family:#04x}:{instance:#04x}")]
    DuplicateIndex { family: u8, instance: u8 },

    #[error("parent {family:#04x}:{instance:#04x} does not exist")]
    MissingParent { family: u8, instance: u8 },

    #[error("layout {family:#04x}:{instance:#04x} is abstract and has no vtable")]
    AbstractLayoutHasNoVtable { family: u8, instance: u8 },

    #[error("index {0:#06x} does not fit in the 15-bit range embeddable in an array header")]
    IndexNotEmbeddable(u16),
}
