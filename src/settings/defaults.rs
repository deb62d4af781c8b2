use crate::image_data::ImageBlob;

use super::{AllSettings, ModeSettings};

pub const RAINBOW_MODE: &str = "rainbow";

const RAINBOW_PROMPT: &str =
    "在第一张人物图像中，让他们像拿着卡片一样拿着第二张图像中的物体。保持人物和背景不变。";
const RAINBOW_CARD_PNG: &[u8] = include_bytes!("rainbow_card.png");
const RAINBOW_CARD_MIME_TYPE: &str = "image/png";

pub fn default_settings() -> AllSettings {
    let mut settings = AllSettings::new();
    settings.insert(
        RAINBOW_MODE.to_string(),
        ModeSettings {
            prompt: RAINBOW_PROMPT.to_string(),
            reference_image: Some(ImageBlob::encode(
                RAINBOW_CARD_MIME_TYPE,
                RAINBOW_CARD_PNG,
            )),
        },
    );
    settings
}
