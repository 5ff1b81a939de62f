mod contracts;
mod external;
mod service;
