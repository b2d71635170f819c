use camera_capture::{adjust, Frame};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgb, RgbImage};

/// Gradient test frame
fn create_test_frame(width: u32, height: u32) -> Frame {
    let mut image = RgbImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let r = ((x as f32 / width as f32) * 255.0) as u8;
        let g = ((y as f32 / height as f32) * 255.0) as u8;
        let b = (x.wrapping_mul(y) % 255) as u8;
        *pixel = Rgb([r, g, b]);
    }
    Frame::from_image(image, 0, 0)
}

fn bench_adjust(c: &mut Criterion) {
    let mut group = c.benchmark_group("adjust");
    let sizes = [(640, 480), (1280, 720)];
    // (name, brightness, contrast, sharpness)
    let cases = [
        ("affine", 20.0, 1.3, 0.0),
        ("sharpen", 0.0, 1.0, 1.5),
        ("blur", 0.0, 1.0, -2.0),
    ];

    for (width, height) in sizes {
        let frame = create_test_frame(width, height);
        group.throughput(Throughput::Elements((width * height) as u64));
        for (name, brightness, contrast, sharpness) in cases {
            group.bench_with_input(
                BenchmarkId::new(name, format!("{}x{}", width, height)),
                &frame,
                |b, frame| b.iter(|| adjust(black_box(frame), brightness, contrast, sharpness)),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_adjust);
criterion_main!(benches);
