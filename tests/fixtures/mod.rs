//! Prompt fixtures for live end-to-end runs.

/// A generation request and what the live service should do with it.
#[derive(Debug, Clone)]
pub struct PromptFixture {
    pub prompt: &'static str,
    pub should_be_accepted: bool,
    pub description: &'static str,
}

pub const PROMPT_FIXTURES: &[PromptFixture] = &[
    PromptFixture {
        prompt: "a red wooden chair with four legs",
        should_be_accepted: true,
        description: "Simple furniture, short prompt",
    },
    PromptFixture {
        prompt: "a low-poly fox sitting on a mossy rock, stylized game asset",
        should_be_accepted: true,
        description: "Character plus base, style hints",
    },
    PromptFixture {
        prompt: "a ceramic coffee mug with a chipped rim",
        should_be_accepted: true,
        description: "Small prop with surface detail",
    },
    PromptFixture {
        prompt: "   ",
        should_be_accepted: false,
        description: "Whitespace only",
    },
    PromptFixture {
        prompt: "<script>alert('x')</script> a chair",
        should_be_accepted: false,
        description: "Script markup",
    },
];

/// Smallest valid PNG: one transparent pixel.
pub const ONE_PIXEL_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];
