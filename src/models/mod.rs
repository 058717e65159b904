// Data models for camera capture and pose landmarks

pub mod capture;
pub mod pose;
