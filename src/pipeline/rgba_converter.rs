use anyhow::{Result, anyhow, ensure};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

/// Pixel layouts a camera may hand us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    Nv12,
    Yuyv,
    Mjpeg,
    Rgb,
    Bgr,
    Gray,
}

/// Decode `data` into `out` as RGBA8, reusing its allocation.
/// Returns the decoded dimensions, which differ from the hint only for MJPEG.
pub fn convert_into(
    layout: PixelLayout,
    data: &[u8],
    width: u32,
    height: u32,
    out: &mut Vec<u8>,
) -> Result<(u32, u32)> {
    match layout {
        PixelLayout::Mjpeg => return mjpeg_into(data, out),
        PixelLayout::Nv12 => nv12_into(data, width, height, out)?,
        PixelLayout::Yuyv => yuyv_into(data, width, height, out)?,
        PixelLayout::Rgb => packed_rgb_into(data, width, height, false, out)?,
        PixelLayout::Bgr => packed_rgb_into(data, width, height, true, out)?,
        PixelLayout::Gray => gray_into(data, width, height, out)?,
    }
    Ok((width, height))
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn prepare(out: &mut Vec<u8>, width: u32, height: u32) {
    out.clear();
    out.resize(pixel_count(width, height) * 4, 0);
}

fn nv12_into(data: &[u8], width: u32, height: u32, out: &mut Vec<u8>) -> Result<()> {
    let y_len = pixel_count(width, height);
    let uv_len = y_len / 2;
    ensure!(
        data.len() >= y_len + uv_len,
        "NV12 buffer too small: got {}, expected {}",
        data.len(),
        y_len + uv_len
    );

    prepare(out, width, height);
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_len],
        y_stride: width,
        uv_plane: &data[y_len..y_len + uv_len],
        uv_stride: width,
        width,
        height,
    };
    yuv_nv12_to_rgba(
        &image,
        out,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 to RGBA failed: {err:?}"))
}

fn yuyv_into(data: &[u8], width: u32, height: u32, out: &mut Vec<u8>) -> Result<()> {
    let expected = pixel_count(width, height) * 2;
    ensure!(
        data.len() >= expected,
        "YUYV buffer too small: got {}, expected {expected}",
        data.len()
    );

    prepare(out, width, height);
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };
    yuyv422_to_rgba(
        &packed,
        out,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422 to RGBA failed: {err:?}"))
}

fn mjpeg_into(data: &[u8], out: &mut Vec<u8>) -> Result<(u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder returned no image info"))?;
    let width = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width does not fit u32"))?;
    let height =
        u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height does not fit u32"))?;
    ensure!(
        rgba.len() >= pixel_count(width, height) * 4,
        "MJPEG decode produced too few bytes: got {}, expected {}",
        rgba.len(),
        pixel_count(width, height) * 4
    );

    *out = rgba;
    Ok((width, height))
}

fn packed_rgb_into(
    data: &[u8],
    width: u32,
    height: u32,
    swap_rb: bool,
    out: &mut Vec<u8>,
) -> Result<()> {
    let expected = pixel_count(width, height) * 3;
    ensure!(
        data.len() >= expected,
        "RGB buffer too small: got {}, expected {expected}",
        data.len()
    );

    prepare(out, width, height);
    out.par_chunks_exact_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            let (r, b) = if swap_rb { (src[2], src[0]) } else { (src[0], src[2]) };
            dst.copy_from_slice(&[r, src[1], b, 255]);
        });
    Ok(())
}

fn gray_into(data: &[u8], width: u32, height: u32, out: &mut Vec<u8>) -> Result<()> {
    let expected = pixel_count(width, height);
    ensure!(
        data.len() >= expected,
        "GRAY buffer too small: got {}, expected {expected}",
        data.len()
    );

    prepare(out, width, height);
    out.par_chunks_exact_mut(4)
        .zip(data.par_iter())
        .for_each(|(dst, &v)| dst.copy_from_slice(&[v, v, v, 255]));
    Ok(())
}

/// Copy `src` into `dst` flipped left to right. Both are RGBA8 with the same
/// dimensions.
pub fn mirror_into(src: &[u8], dst: &mut [u8], width: u32) {
    let stride = width as usize * 4;
    if stride == 0 {
        return;
    }
    dst.par_chunks_exact_mut(stride)
        .zip(src.par_chunks_exact(stride))
        .for_each(|(dst_row, src_row)| {
            for (dst_px, src_px) in dst_row
                .chunks_exact_mut(4)
                .zip(src_row.chunks_exact(4).rev())
            {
                dst_px.copy_from_slice(src_px);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_swaps_channels_and_sets_alpha() {
        let mut out = Vec::new();
        let dims = convert_into(PixelLayout::Bgr, &[1, 2, 3, 4, 5, 6], 2, 1, &mut out).unwrap();
        assert_eq!(dims, (2, 1));
        assert_eq!(out, [3, 2, 1, 255, 6, 5, 4, 255]);
    }

    #[test]
    fn gray_expands_to_rgba() {
        let mut out = vec![9u8; 64];
        convert_into(PixelLayout::Gray, &[10, 200], 2, 1, &mut out).unwrap();
        assert_eq!(out, [10, 10, 10, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let mut out = Vec::new();
        assert!(convert_into(PixelLayout::Rgb, &[0; 5], 2, 1, &mut out).is_err());
        assert!(convert_into(PixelLayout::Yuyv, &[0; 3], 2, 1, &mut out).is_err());
        assert!(convert_into(PixelLayout::Nv12, &[0; 4], 2, 2, &mut out).is_err());
    }

    #[test]
    fn mirror_reverses_each_row() {
        #[rustfmt::skip]
        let src = [
            1, 1, 1, 1,  2, 2, 2, 2,  3, 3, 3, 3,
            4, 4, 4, 4,  5, 5, 5, 5,  6, 6, 6, 6,
        ];
        let mut dst = [0u8; 24];
        mirror_into(&src, &mut dst, 3);
        #[rustfmt::skip]
        let expected = [
            3, 3, 3, 3,  2, 2, 2, 2,  1, 1, 1, 1,
            6, 6, 6, 6,  5, 5, 5, 5,  4, 4, 4, 4,
        ];
        assert_eq!(dst, expected);
    }
}
