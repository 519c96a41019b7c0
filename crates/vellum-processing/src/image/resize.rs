use image::imageops::FilterType;
use image::DynamicImage;

/// Scale `(width, height)` to fit inside a `max_edge` square, preserving aspect.
/// Never upscales; each side is at least 1 pixel.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }

    let scale = f64::from(max_edge) / f64::from(width.max(height));
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, max_edge);
    (scaled(width), scaled(height))
}

/// Filter for a downscale by the given ratio (source edge / target edge)
pub fn select_filter(ratio: f64) -> FilterType {
    if ratio >= 4.0 {
        FilterType::Triangle
    } else {
        FilterType::CatmullRom
    }
}

/// Fit inside the box without upscaling
pub fn fit(img: &DynamicImage, max_edge: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let (target_w, target_h) = fit_within(width, height, max_edge);
    if (target_w, target_h) == (width, height) {
        return img.clone();
    }

    let ratio = f64::from(width.max(height)) / f64::from(max_edge);
    img.resize_exact(target_w, target_h, select_filter(ratio))
}

/// Scale to cover the square box, then center-crop to exactly `edge`x`edge`
pub fn cover(img: &DynamicImage, edge: u32) -> DynamicImage {
    let short = img.width().min(img.height()).max(1);
    let ratio = f64::from(short) / f64::from(edge);
    img.resize_to_fill(edge, edge, select_filter(ratio))
}
