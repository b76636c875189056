// The instruction sent with every image. Holes are drilled into formwork panels on
// purpose, so the model is told explicitly not to flag them.

/// The fixed defect-detection instruction submitted alongside each image.
pub const DEFECT_PROMPT: &str = "\
Is this aluminium steel or slab defective or not? The defect can be of various types like crack, bent, cut-off, etc.

For example:
        - Welded portion got cut-off
        - Bent slab
        - Cracked slab
        - Damaged panel
        - etc.

Note: Holes are not considered defects.

Answer YES or NO only.";
