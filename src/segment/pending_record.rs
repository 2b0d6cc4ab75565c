/// A record handed to a segment but not yet stored in its file.
#[derive(Debug, Clone)]
pub(crate) struct PendingRecord {
    pub(crate) bytes: Vec<u8>,

    /// The LSN position of the record.
    pub(crate) from: u64,

    /// The `filled_up_to` of the segment after this record.
    pub(crate) to: u64,
}
