// Drives NeoPixels on a strip that keeps its pixels in memory.
//
// Copyright (c) 2017-2026 quantenschaum <software@louisenhof2.de>
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
// THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

use std::sync::{Arc, Mutex};

use piripherals::led::{self, Animation, Color, NeoPixels, Pixel, Strip};

#[derive(Debug, Default)]
struct Frames {
    pixels: Vec<(u8, u8, u8)>,
    brightness: u8,
    shown: Vec<Vec<(u8, u8, u8)>>,
}

struct MemoryStrip(Arc<Mutex<Frames>>);

impl Strip for MemoryStrip {
    fn len(&self) -> usize {
        self.0.lock().unwrap().pixels.len()
    }

    fn set_pixel(&mut self, index: usize, rgb: (u8, u8, u8)) {
        if let Some(pixel) = self.0.lock().unwrap().pixels.get_mut(index) {
            *pixel = rgb;
        }
    }

    fn brightness(&self) -> u8 {
        self.0.lock().unwrap().brightness
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.0.lock().unwrap().brightness = brightness;
    }

    fn show(&mut self) -> led::Result<()> {
        let mut frames = self.0.lock().unwrap();
        let pixels = frames.pixels.clone();
        frames.shown.push(pixels);

        Ok(())
    }
}

fn strip(len: usize) -> (NeoPixels<MemoryStrip>, Arc<Mutex<Frames>>) {
    let frames = Arc::new(Mutex::new(Frames {
        pixels: vec![(0, 0, 0); len],
        brightness: 255,
        shown: Vec::new(),
    }));

    (NeoPixels::new(MemoryStrip(frames.clone())).unwrap(), frames)
}

#[test]
fn negative_index_addresses_last_pixel() {
    let (mut leds, frames) = strip(4);

    leds.color(Pixel::Index(-1), Color::BLUE, None).unwrap();
    leds.color(Pixel::Index(0), Color::rgb(1.0, 0.5, 0.0), None).unwrap();

    let frames = frames.lock().unwrap();
    assert_eq!(
        frames.pixels,
        vec![(255, 127, 0), (0, 0, 0), (0, 0, 0), (0, 0, 255)]
    );
    assert_eq!(frames.shown.len(), 3);
}

#[test]
fn animation_runs_for_its_cycles_and_blanks_the_strip() {
    let (mut leds, frames) = strip(2);

    leds.sequence(
        &[Color::RED, Color::GREEN],
        Animation {
            freq: 10.0,
            cycles: 2.0,
            wait: true,
            ..Animation::default()
        },
    )
    .unwrap();

    assert!(!leds.is_animating());

    let frames = frames.lock().unwrap();
    assert!(frames.shown.len() > 5);
    assert!(frames.shown[1..]
        .iter()
        .take(3)
        .all(|pixels| pixels[0] == pixels[1] && pixels[0].2 == 0));
    assert_eq!(frames.pixels, vec![(0, 0, 0); 2]);
    assert_eq!(frames.brightness, 255);
}

#[test]
fn endless_animation_stops_on_request() {
    let (mut leds, frames) = strip(3);

    leds.rainbow(Animation::default()).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(leds.is_animating());

    leds.stop().unwrap();
    assert!(!leds.is_animating());
    assert_eq!(frames.lock().unwrap().pixels, vec![(0, 0, 0); 3]);

    assert!(matches!(
        leds.rainbow(Animation {
            wait: true,
            ..Animation::default()
        }),
        Err(led::Error::InfiniteWait)
    ));
}
