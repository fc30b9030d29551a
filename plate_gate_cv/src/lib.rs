pub mod plate_detection;
