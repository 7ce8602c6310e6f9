pub const FRAMES_MAX: usize = 64;
pub const FRAME_SLOTS: usize = 256;
pub const MAX_STACK_SIZE: usize = FRAMES_MAX * FRAME_SLOTS;
