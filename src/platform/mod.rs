// Integrations with the external collaborators: camera devices and the pose model

pub mod camera;
pub mod pose;
