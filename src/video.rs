//! Native video surface backed by GStreamer.
//!
//! One clip at a time is decoded into RGBA frames for the renderer. The end
//! of a clip, or a pipeline error, is reported once through
//! [`VideoSurface::take_finished`].

use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::sync::{Arc, Mutex};

/// Decoded RGBA frame.
pub struct VideoFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Latest frame written by the appsink thread.
type FrameSlot = Arc<Mutex<Option<Arc<VideoFrame>>>>;

/// Initialize GStreamer (call once at startup).
pub fn init() -> Result<()> {
    gst::init().context("Failed to initialize GStreamer")?;
    tracing::info!("GStreamer initialized: {}", gst::version_string());
    Ok(())
}

fn element(factory: &str) -> Result<gst::Element> {
    gst::ElementFactory::make(factory)
        .build()
        .with_context(|| format!("Failed to create {}", factory))
}

/// `uridecodebin ! videoconvert ! videoscale ! appsink(RGBA)`
fn build_pipeline(uri: &str, slot: FrameSlot) -> Result<gst::Pipeline> {
    let pipeline = gst::Pipeline::new();

    let decode = gst::ElementFactory::make("uridecodebin")
        .property("uri", uri)
        .build()
        .context("Failed to create uridecodebin")?;
    let convert = element("videoconvert")?;
    let scale = element("videoscale")?;
    let sink = gst_app::AppSink::builder()
        .caps(
            &gst_video::VideoCapsBuilder::new()
                .format(gst_video::VideoFormat::Rgba)
                .build(),
        )
        .build();

    sink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let frame = sample_to_frame(&sample).ok_or(gst::FlowError::Error)?;
                if let Ok(mut latest) = slot.lock() {
                    *latest = Some(Arc::new(frame));
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );

    pipeline
        .add_many([&decode, &convert, &scale, sink.upcast_ref()])
        .context("Failed to assemble pipeline")?;
    gst::Element::link_many([&convert, &scale, sink.upcast_ref()])
        .context("Failed to link pipeline")?;

    let convert = convert.downgrade();
    decode.connect_pad_added(move |_, pad| {
        if let Some(convert) = convert.upgrade() {
            link_video_pad(pad, &convert);
        }
    });

    Ok(pipeline)
}

/// Link a decoded pad to the converter if it carries video. Audio is dropped.
fn link_video_pad(pad: &gst::Pad, convert: &gst::Element) {
    let Some(sink_pad) = convert.static_pad("sink") else {
        return;
    };
    if sink_pad.is_linked() {
        return;
    }

    let caps = pad.current_caps().unwrap_or_else(|| pad.query_caps(None));
    let is_video = caps
        .structure(0)
        .is_some_and(|s| s.name().starts_with("video/"));
    if !is_video {
        return;
    }

    if let Err(e) = pad.link(&sink_pad) {
        tracing::error!("Failed to link decoded video pad: {:?}", e);
    }
}

fn sample_to_frame(sample: &gst::Sample) -> Option<VideoFrame> {
    let info = gst_video::VideoInfo::from_caps(sample.caps()?).ok()?;
    let map = sample.buffer()?.map_readable().ok()?;
    Some(VideoFrame {
        pixels: map.as_slice().to_vec(),
        width: info.width(),
        height: info.height(),
    })
}

/// A single playing (or paused) clip.
struct Clip {
    pipeline: gst::Pipeline,
    bus: gst::Bus,
    latest: FrameSlot,
    paused: bool,
}

impl Clip {
    fn start(uri: &str) -> Result<Self> {
        tracing::debug!("Starting clip {}", uri);
        let latest = FrameSlot::default();
        let pipeline = build_pipeline(uri, latest.clone())?;
        let bus = pipeline.bus().context("Pipeline has no bus")?;

        let clip = Self {
            pipeline,
            bus,
            latest,
            paused: false,
        };
        clip.set_state(gst::State::Playing)?;
        Ok(clip)
    }

    fn set_state(&self, state: gst::State) -> Result<()> {
        self.pipeline
            .set_state(state)
            .with_context(|| format!("Failed to set pipeline to {:?}", state))?;
        Ok(())
    }

    /// Drain EOS and error messages. True once the clip can no longer play.
    fn drain_bus(&self) -> bool {
        let mut finished = false;
        while let Some(msg) = self
            .bus
            .pop_filtered(&[gst::MessageType::Eos, gst::MessageType::Error])
        {
            if let gst::MessageView::Error(err) = msg.view() {
                tracing::error!("Video pipeline error: {} ({:?})", err.error(), err.debug());
            }
            finished = true;
        }
        finished
    }
}

impl Drop for Clip {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// The video surface: owns at most one clip.
#[derive(Default)]
pub struct VideoSurface {
    clip: Option<Clip>,
}

impl VideoSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current clip with `uri`. An error means it could not start.
    pub fn play(&mut self, uri: &str) -> Result<()> {
        self.stop();
        self.clip = Some(Clip::start(uri)?);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.clip = None;
    }

    pub fn pause(&mut self) -> Result<()> {
        match self.clip.as_mut() {
            Some(clip) if !clip.paused => {
                clip.set_state(gst::State::Paused)?;
                clip.paused = true;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        match self.clip.as_mut() {
            Some(clip) if clip.paused => {
                clip.set_state(gst::State::Playing)?;
                clip.paused = false;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Latest decoded frame, shared with the appsink thread.
    pub fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        self.clip.as_ref()?.latest.lock().ok()?.clone()
    }

    /// True exactly once per finished clip; the clip is released.
    pub fn take_finished(&mut self) -> bool {
        let finished = self.clip.as_ref().is_some_and(Clip::drain_bus);
        if finished {
            self.stop();
        }
        finished
    }
}
