pub mod rekognition;
