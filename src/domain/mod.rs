// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust types and traits that describe what the system
// works with: audio clips, experiment log values, and the
// seams (traits) that the data and infra layers implement.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs, enums and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A decoded, multi-channel audio clip
pub mod audio;

// Values sent to the experiment tracker
pub mod log_entry;

// Core abstractions (traits) that other layers implement
pub mod traits;
