// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Workflow coordination only: no tensor math (Layer 5), no
// argument parsing (Layer 1), no file formats (Layers 4 and 6).

// Load audio, build datasets, run the adversarial training loop
pub mod train_use_case;

// Encode/decode a single file with the latest checkpoint
pub mod reconstruct_use_case;
