use super::*;

#[test]
fn eye_frame_size_halves_width_with_integer_division() {
    for w in [2u32, 3, 1920, 3840, 3841] {
        let eye = FrameSize::new(w, 1080).unwrap().eye_frame_size();
        assert_eq!(eye.width, w / 2);
        assert_eq!(eye.height, 1080);
    }
}

#[test]
fn frame_size_rejects_zero() {
    assert!(FrameSize::new(0, 10).is_err());
    assert!(FrameSize::new(10, 0).is_err());
}

#[test]
fn layer_ids_map_to_views() {
    assert_eq!(LayerId::Left.index(), 0);
    assert_eq!(LayerId::Right.index(), 1);
    assert_eq!(LayerId::from_index(1), Some(LayerId::Right));
    assert_eq!(LayerId::from_index(2), None);
    assert_eq!(LayerId::Left.stereo_view(), StereoView::Left);
    assert_eq!(LayerId::Right.stereo_view(), StereoView::Right);
}

#[test]
fn frame_rate_parses_ffprobe_ratios() {
    assert_eq!(
        FrameRate::parse_ratio("30000/1001").unwrap(),
        FrameRate {
            num: 30000,
            den: 1001
        }
    );
    assert_eq!(FrameRate::parse_ratio("30").unwrap(), FrameRate { num: 30, den: 1 });
    assert!(FrameRate::parse_ratio("0/0").is_err());
    assert!(FrameRate::parse_ratio("abc").is_err());
}

#[test]
fn frame_time_is_exact() {
    let rate = FrameRate::new(30, 1).unwrap();
    let t = rate.frame_time(45);
    assert_eq!(t, MediaTime { value: 45, timescale: 30 });
    assert!((t.as_secs_f64() - 1.5).abs() < 1e-12);
}

#[test]
fn media_time_orders_across_timescales() {
    let a = MediaTime::new(1, 30).unwrap();
    let b = MediaTime::new(1001, 30000).unwrap();
    assert!(a < b);
    assert!(MediaTime::ZERO < a);
    assert_eq!(MediaTime::new(2, 60).unwrap(), a);
}
