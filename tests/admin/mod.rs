mod admin_api_tests;
