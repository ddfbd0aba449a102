pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod params;
pub mod sources;
pub mod processing {
    pub mod color;
    pub mod develop;
    pub mod fit;
    pub mod resample;
}
pub mod render {
    pub mod compose;
    pub mod offscreen;
    pub mod window;
}
pub mod tasks {
    pub mod controls;
    pub mod frame_loop;
}
